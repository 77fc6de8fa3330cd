//! CLI command implementations
//!
//! `flash` and `submit` hand a command to a `ProgrammingOrchestrator`
//! running on a simulated target and follow the job with a progress bar.
//! `info` only reads the algorithm description.

mod flash;
mod info;

pub use flash::{run_flash, run_submit, FlashRequest};
pub use info::run_info;

use thiserror::Error;

/// Outcome of a submitted job that did not succeed
#[derive(Debug, Error)]
pub enum CommandError {
    /// The programmer refused the command
    #[error("command rejected (run with -v for details)")]
    Rejected,

    /// The job started but did not complete
    #[error("programming failed at {0}%")]
    Failed(u8),
}
