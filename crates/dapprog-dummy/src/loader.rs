//! Loader for simulated algorithms

use std::path::Path;
use std::sync::{Arc, Mutex};

use dapprog_core::loader::{AlgorithmLoader, LoadError, LoadedAlgorithm};

use crate::description::AlgorithmDescription;
use crate::flash::{lock_flash, FlashMemory, SharedFlash, SimulatedTarget};

/// Loads algorithm description files as simulated targets
///
/// All targets created by one loader operate on the same flash, so a
/// second job sees what the first one wrote. The flash is recreated
/// (erased) when an algorithm with a different layout is loaded.
#[derive(Debug)]
pub struct DescriptionLoader {
    flash: SharedFlash,
    loads: usize,
}

impl DescriptionLoader {
    /// Create a loader with no flash contents yet
    pub fn new() -> Self {
        Self {
            flash: Arc::new(Mutex::new(FlashMemory::new(0, 0))),
            loads: 0,
        }
    }

    /// Handle to the simulated flash, valid across loads
    pub fn flash(&self) -> SharedFlash {
        Arc::clone(&self.flash)
    }

    /// Number of successful loads
    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl Default for DescriptionLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmLoader for DescriptionLoader {
    fn load(&mut self, path: &Path, ram_addr: u32) -> Result<LoadedAlgorithm, LoadError> {
        let desc = AlgorithmDescription::from_file(path)?;
        desc.check_load_address(ram_addr)?;

        {
            let mut flash = lock_flash(&self.flash);
            if flash.base() != desc.flash_start || flash.data().len() != desc.flash_size as usize {
                log::debug!(
                    "Creating simulated flash 0x{:08X}..0x{:08X}",
                    desc.flash_range().start,
                    desc.flash_range().end
                );
                *flash = FlashMemory::new(desc.flash_start, desc.flash_size as usize);
            }
        }

        log::info!(
            "Loaded algorithm '{}' at 0x{:08X} ({} bytes)",
            desc.name,
            ram_addr,
            desc.blob_size
        );
        self.loads += 1;

        Ok(LoadedAlgorithm {
            config: desc.target_config(ram_addr),
            target: Box::new(SimulatedTarget::new(desc, self.flash())),
        })
    }
}
