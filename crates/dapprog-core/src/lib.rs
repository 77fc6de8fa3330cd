//! dapprog-core - Core flash write engine for in-circuit programming
//!
//! This crate provides the buffered write engine that programs a firmware
//! image through a flash algorithm running on the target. It is designed
//! to be `no_std` compatible so the same engine can run on the programmer
//! debug adapter itself.
//!
//! # Features
//!
//! - `std` - Enable standard library support, the `loader` module and the
//!   `units` parsing helpers
//!
//! # Example
//!
//! ```ignore
//! use dapprog_core::{BufferedFlashWriter, FlashAlgorithmTarget};
//!
//! fn program<T: FlashAlgorithmTarget>(
//!     target: &mut T,
//!     image: &[(u32, &[u8])],
//! ) -> dapprog_core::Result<()> {
//!     let mut writer: BufferedFlashWriter<'_, T> = BufferedFlashWriter::new();
//!     writer.init(target)?;
//!     for (addr, data) in image {
//!         writer.write(*addr, data)?;
//!     }
//!     writer.uninit()
//! }
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
#[cfg(feature = "std")]
pub mod loader;
pub mod target;
#[cfg(feature = "std")]
pub mod units;
pub mod writer;

pub use error::{Error, Result, TargetFault, TargetOperation};
pub use target::{Capabilities, FlashAlgorithmTarget, TargetResult};
pub use writer::{BufferedFlashWriter, SessionState, DEFAULT_PAGE_BUFFER_SIZE, ERASED_VALUE};
