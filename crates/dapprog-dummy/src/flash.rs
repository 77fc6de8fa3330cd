//! Simulated flash algorithm
//!
//! `SimulatedTarget` behaves like a flash algorithm running on a device
//! whose flash is kept in memory. Programming can only clear bits and
//! erasing sets a whole sector back to 0xFF, like real NOR flash.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dapprog_core::{Capabilities, FlashAlgorithmTarget, TargetFault, TargetResult, ERASED_VALUE};

use crate::description::AlgorithmDescription;

/// Operation called before `Init`
pub const FAULT_NOT_INITIALIZED: TargetFault = TargetFault(1);
/// Address range outside the device flash
pub const FAULT_OUT_OF_RANGE: TargetFault = TargetFault(2);
/// Address not aligned to a page or sector
pub const FAULT_MISALIGNED: TargetFault = TargetFault(3);
/// Failure requested by the description's `fail_at`
pub const FAULT_INJECTED: TargetFault = TargetFault(4);

/// In-memory flash contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMemory {
    base: u32,
    data: Vec<u8>,
}

impl FlashMemory {
    /// Create erased flash of `size` bytes starting at `base`
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            data: vec![ERASED_VALUE; size],
        }
    }

    /// First address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Whole flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read `len` bytes at `addr`
    pub fn read(&self, addr: u32, len: usize) -> Option<&[u8]> {
        let start = addr.checked_sub(self.base)? as usize;
        self.data.get(start..start.checked_add(len)?)
    }

    fn slice_mut(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let start = addr.checked_sub(self.base)? as usize;
        self.data.get_mut(start..start.checked_add(len)?)
    }
}

/// Flash contents shared between a loader and the targets it creates
pub type SharedFlash = Arc<Mutex<FlashMemory>>;

/// Lock shared flash, ignoring poisoning from a panicked holder
pub fn lock_flash(flash: &SharedFlash) -> MutexGuard<'_, FlashMemory> {
    flash.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters of the operations a target performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetStats {
    /// Sector erases
    pub sectors_erased: u32,
    /// Chip erases
    pub chip_erases: u32,
    /// ProgramPage calls
    pub pages_programmed: u32,
    /// Bytes handed to ProgramPage
    pub bytes_programmed: u64,
}

/// A flash algorithm simulated on top of `FlashMemory`
#[derive(Debug)]
pub struct SimulatedTarget {
    desc: AlgorithmDescription,
    flash: SharedFlash,
    initialized: bool,
    selected: Option<u32>,
    stats: TargetStats,
}

impl SimulatedTarget {
    /// Create a target for `desc` operating on `flash`
    pub fn new(desc: AlgorithmDescription, flash: SharedFlash) -> Self {
        Self {
            desc,
            flash,
            initialized: false,
            selected: None,
            stats: TargetStats::default(),
        }
    }

    /// Create a target with its own erased flash
    pub fn standalone(desc: AlgorithmDescription) -> Self {
        let flash = FlashMemory::new(desc.flash_start, desc.flash_size as usize);
        Self::new(desc, Arc::new(Mutex::new(flash)))
    }

    /// The description this target simulates
    pub fn description(&self) -> &AlgorithmDescription {
        &self.desc
    }

    /// Handle to the flash contents
    pub fn flash(&self) -> SharedFlash {
        Arc::clone(&self.flash)
    }

    /// Operation counters
    pub fn stats(&self) -> TargetStats {
        self.stats
    }

    /// Address last passed to `select_algorithm`
    pub fn selected(&self) -> Option<u32> {
        self.selected
    }

    /// Whether `Init` has been called without a matching `UnInit`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn check_initialized(&self) -> TargetResult {
        if self.initialized {
            Ok(())
        } else {
            Err(FAULT_NOT_INITIALIZED)
        }
    }

    fn check_fault(&self, addr: u32, len: u32) -> TargetResult {
        match self.desc.fail_at {
            Some(fail) if fail >= addr && (fail as u64) < addr as u64 + len as u64 => {
                log::debug!("Simulated fault at 0x{:08X}", fail);
                Err(FAULT_INJECTED)
            }
            _ => Ok(()),
        }
    }
}

impl FlashAlgorithmTarget for SimulatedTarget {
    fn capabilities(&self) -> Capabilities {
        self.desc.capabilities()
    }

    fn init(&mut self) -> TargetResult {
        self.initialized = true;
        Ok(())
    }

    // Closing an already closed algorithm is a no-op
    fn uninit(&mut self) -> TargetResult {
        self.initialized = false;
        self.selected = None;
        Ok(())
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) -> TargetResult {
        self.check_initialized()?;
        if !self.desc.flash_range().contains(&addr) {
            return Err(FAULT_OUT_OF_RANGE);
        }
        if (addr - self.desc.flash_start) % self.desc.page_size != 0 {
            return Err(FAULT_MISALIGNED);
        }
        self.check_fault(addr, data.len() as u32)?;

        let mut flash = lock_flash(&self.flash);
        let region = flash
            .slice_mut(addr, data.len())
            .ok_or(FAULT_OUT_OF_RANGE)?;
        // Programming can only change 1 -> 0
        for (cell, &byte) in region.iter_mut().zip(data) {
            *cell &= byte;
        }

        self.stats.pages_programmed += 1;
        self.stats.bytes_programmed += data.len() as u64;
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> TargetResult {
        self.check_initialized()?;
        let start = self.desc.sector_start(addr).ok_or(FAULT_OUT_OF_RANGE)?;
        if start != addr {
            return Err(FAULT_MISALIGNED);
        }
        let size = self.desc.sector_size(addr);
        self.check_fault(addr, size)?;

        let mut flash = lock_flash(&self.flash);
        let sector = flash
            .slice_mut(addr, size as usize)
            .ok_or(FAULT_OUT_OF_RANGE)?;
        sector.fill(ERASED_VALUE);

        self.stats.sectors_erased += 1;
        Ok(())
    }

    fn erase_chip(&mut self) -> TargetResult {
        self.check_initialized()?;
        self.check_fault(self.desc.flash_start, self.desc.flash_size)?;

        let mut flash = lock_flash(&self.flash);
        let all = flash
            .slice_mut(self.desc.flash_start, self.desc.flash_size as usize)
            .ok_or(FAULT_OUT_OF_RANGE)?;
        all.fill(ERASED_VALUE);

        self.stats.chip_erases += 1;
        Ok(())
    }

    fn program_page_min_size(&self, addr: u32) -> u32 {
        if self.desc.flash_range().contains(&addr) {
            self.desc.page_size
        } else {
            0
        }
    }

    fn erase_sector_size(&self, addr: u32) -> u32 {
        self.desc.sector_size(addr)
    }

    fn flash_busy(&mut self) -> bool {
        // Every operation completes before returning
        false
    }

    fn select_algorithm(&mut self, addr: u32) -> TargetResult {
        if !self.desc.flash_range().contains(&addr) {
            return Err(FAULT_OUT_OF_RANGE);
        }
        self.selected = Some(addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::tests::MIXED;
    use dapprog_core::{BufferedFlashWriter, Error, TargetOperation};

    fn target() -> SimulatedTarget {
        SimulatedTarget::standalone(AlgorithmDescription::from_toml_str(MIXED).unwrap())
    }

    #[test]
    fn test_program_and_read() {
        let mut t = target();
        t.init().unwrap();
        t.program_page(0x0800_0400, &[0x12, 0x34, 0x56, 0x78]).unwrap();

        let flash = t.flash();
        let flash = lock_flash(&flash);
        assert_eq!(flash.read(0x0800_0400, 4).unwrap(), &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(flash.read(0x0800_0404, 1).unwrap(), &[0xFF]);
        assert!(flash.read(0x0803_FFFF, 2).is_none());
        assert!(flash.read(0x07FF_FFFF, 1).is_none());
    }

    #[test]
    fn test_program_clears_bits_only() {
        let mut t = target();
        t.init().unwrap();
        t.program_page(0x0800_0000, &[0xF0]).unwrap();
        t.program_page(0x0800_0000, &[0x0F]).unwrap();
        assert_eq!(lock_flash(&t.flash()).read(0x0800_0000, 1).unwrap(), &[0x00]);

        t.erase_sector(0x0800_0000).unwrap();
        t.program_page(0x0800_0000, &[0x0F]).unwrap();
        assert_eq!(lock_flash(&t.flash()).read(0x0800_0000, 1).unwrap(), &[0x0F]);
    }

    #[test]
    fn test_erase_rules() {
        let mut t = target();
        t.init().unwrap();
        t.program_page(0x0801_0000, &[0u8; 1024]).unwrap();

        assert_eq!(t.erase_sector(0x0801_0400), Err(FAULT_MISALIGNED));
        assert_eq!(t.erase_sector(0x0900_0000), Err(FAULT_OUT_OF_RANGE));
        t.erase_sector(0x0801_0000).unwrap();
        assert!(lock_flash(&t.flash())
            .read(0x0801_0000, 64 * 1024)
            .unwrap()
            .iter()
            .all(|&b| b == 0xFF));

        t.program_page(0x0800_0000, &[0u8; 16]).unwrap();
        t.erase_chip().unwrap();
        assert!(lock_flash(&t.flash()).data().iter().all(|&b| b == 0xFF));

        let stats = t.stats();
        assert_eq!(stats.sectors_erased, 1);
        assert_eq!(stats.chip_erases, 1);
        assert_eq!(stats.pages_programmed, 2);
        assert_eq!(stats.bytes_programmed, 1040);
    }

    #[test]
    fn test_requires_init() {
        let mut t = target();
        assert_eq!(t.program_page(0x0800_0000, &[0]), Err(FAULT_NOT_INITIALIZED));
        assert_eq!(t.erase_sector(0x0800_0000), Err(FAULT_NOT_INITIALIZED));
        t.init().unwrap();
        assert!(t.is_initialized());
        t.uninit().unwrap();
        assert!(!t.is_initialized());
        assert_eq!(t.uninit(), Ok(()));
    }

    #[test]
    fn test_misaligned_program() {
        let mut t = target();
        t.init().unwrap();
        assert_eq!(t.program_page(0x0800_0001, &[0]), Err(FAULT_MISALIGNED));
        assert_eq!(t.program_page(0x0803_FC00, &[0; 2048]), Err(FAULT_OUT_OF_RANGE));
    }

    #[test]
    fn test_injected_fault() {
        // Top-level keys must precede the first table
        let desc =
            AlgorithmDescription::from_toml_str(&format!("fail_at = 0x0801_0010\n{MIXED}"))
                .unwrap();
        assert_eq!(desc.fail_at, Some(0x0801_0010));

        let mut t = SimulatedTarget::standalone(desc);
        t.init().unwrap();
        t.erase_sector(0x0800_0000).unwrap();
        assert_eq!(t.erase_sector(0x0801_0000), Err(FAULT_INJECTED));
        assert_eq!(t.program_page(0x0801_0000, &[0; 1024]), Err(FAULT_INJECTED));
        t.program_page(0x0801_0400, &[0; 1024]).unwrap();
    }

    #[test]
    fn test_writer_close_after_erase_failure() {
        let desc =
            AlgorithmDescription::from_toml_str(&format!("fail_at = 0x0801_0010\n{MIXED}"))
                .unwrap();
        let mut t = SimulatedTarget::standalone(desc);
        {
            let mut writer: BufferedFlashWriter<'_, SimulatedTarget> = BufferedFlashWriter::new();
            writer.init(&mut t).unwrap();
            let err = writer.write(0x0801_0000, &[0; 16]).unwrap_err();
            assert_eq!(
                err,
                Error::target(TargetOperation::EraseSector(0x0801_0000), FAULT_INJECTED)
            );
            // The writer already closed the algorithm, closing again is clean
            assert_eq!(writer.uninit(), Ok(()));
        }
        assert!(!t.is_initialized());
        assert_eq!(t.stats().sectors_erased, 0);
    }

    #[test]
    fn test_geometry_queries() {
        let mut t = target();
        assert_eq!(t.program_page_min_size(0x0800_0000), 1024);
        assert_eq!(t.program_page_min_size(0x0900_0000), 0);
        assert_eq!(t.erase_sector_size(0x0800_C000), 16 * 1024);
        assert_eq!(t.erase_sector_size(0x0802_0000), 128 * 1024);
        assert!(!t.flash_busy());
        t.select_algorithm(0x0802_0000).unwrap();
        assert_eq!(t.selected(), Some(0x0802_0000));
    }

    #[test]
    fn test_writer_on_mixed_sectors() {
        let mut t = target();
        let image: Vec<u8> = (0..40 * 1024u32).map(|i| (i % 251) as u8).collect();

        // Starts inside the last 16K sector and runs into the 64K sector
        let start = 0x0800_C000;
        {
            let mut writer: BufferedFlashWriter<'_, SimulatedTarget> = BufferedFlashWriter::new();
            writer.init(&mut t).unwrap();
            for (i, chunk) in image.chunks(1000).enumerate() {
                writer.write(start + (i * 1000) as u32, chunk).unwrap();
            }
            writer.uninit().unwrap();
        }

        assert!(!t.is_initialized());
        assert_eq!(t.stats().sectors_erased, 2);
        assert_eq!(
            lock_flash(&t.flash()).read(start, image.len()).unwrap(),
            &image[..]
        );
    }
}
