//! Flash algorithm loading
//!
//! An `AlgorithmLoader` turns a packaged flash algorithm into a callable
//! `FlashAlgorithmTarget`: it places the algorithm in target RAM at the
//! requested address and resolves its entry points. The package format is
//! up to the implementation.

use core::ops::Range;
use std::error::Error as StdError;
use std::path::Path;

use crate::target::FlashAlgorithmTarget;

/// Error returned by algorithm loaders
pub type LoadError = Box<dyn StdError + Send + Sync>;

/// Target configuration that came with a loaded algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Human readable algorithm name
    pub name: String,
    /// Flash address range served by the algorithm
    pub flash: Range<u32>,
    /// Target RAM available to the algorithm
    pub ram: Range<u32>,
    /// Address the algorithm was loaded to
    pub load_addr: u32,
    /// CPU clock the algorithm expects, in Hz
    pub clock_hz: u32,
    /// Program page size hint
    pub page_size: u32,
    /// Smallest erase sector size hint
    pub sector_size: u32,
}

/// A flash algorithm ready to be called
///
/// Dropping this value releases everything the loader allocated for it.
pub struct LoadedAlgorithm {
    /// The callable algorithm
    pub target: Box<dyn FlashAlgorithmTarget + Send>,
    /// Configuration described by the algorithm package
    pub config: TargetConfig,
}

impl core::fmt::Debug for LoadedAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoadedAlgorithm")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Produces flash algorithm targets from algorithm packages
pub trait AlgorithmLoader {
    /// Load the algorithm at `path` into target RAM at `ram_addr`
    fn load(&mut self, path: &Path, ram_addr: u32) -> Result<LoadedAlgorithm, LoadError>;
}
