//! dapprog-programmer - Job orchestration for dapprog
//!
//! This crate accepts programming commands, validates them, and runs the
//! resulting jobs one at a time on a background worker: load the flash
//! algorithm, decode the image, and stream it through a
//! [`BufferedFlashWriter`](dapprog_core::BufferedFlashWriter).
//!
//! # Example
//!
//! ```ignore
//! use dapprog_programmer::{ProgrammerConfig, ProgrammingOrchestrator};
//!
//! let orchestrator = ProgrammingOrchestrator::spawn(ProgrammerConfig::default(), loader)?;
//! if orchestrator.submit(br#"{"algorithm": "f4.toml", "program": "app.hex"}"#) {
//!     while orchestrator.is_busy() {
//!         println!("{}%", orchestrator.progress());
//!         std::thread::sleep(std::time::Duration::from_millis(100));
//!     }
//! }
//! ```

pub mod command;
pub mod config;
pub mod job;
pub mod orchestrator;
pub mod progress;

pub use command::{ProgrammingJob, ValidationError};
pub use config::{ConfigError, ProgrammerConfig, DEFAULT_MAX_COMMAND_LEN, DEFAULT_RAM_ADDR};
pub use job::{run_job, JobError, JobReport};
pub use orchestrator::ProgrammingOrchestrator;
pub use progress::Progress;
