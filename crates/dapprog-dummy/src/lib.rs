//! dapprog-dummy - Simulated flash algorithms for testing
//!
//! This crate stands in for a real debug adapter and device. Algorithm "packages"
//! are small TOML files describing a device's flash layout, and the
//! resulting targets program an in-memory flash. It's useful for testing
//! and development without real hardware.

mod description;
mod error;
mod flash;
mod loader;

pub use description::{AlgorithmDescription, EntryPoint, SectorRegion};
pub use error::{DescriptionError, Result};
pub use flash::{
    lock_flash, FlashMemory, SharedFlash, SimulatedTarget, TargetStats, FAULT_INJECTED,
    FAULT_MISALIGNED, FAULT_NOT_INITIALIZED, FAULT_OUT_OF_RANGE,
};
pub use loader::DescriptionLoader;
