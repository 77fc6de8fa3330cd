//! Flash algorithm target trait
//!
//! A `FlashAlgorithmTarget` is a flash algorithm that has been loaded into
//! target RAM and can be called through its entry points. Implementations
//! exist per target family; the write engine only ever sees this trait.

use bitflags::bitflags;

use crate::error::TargetFault;

bitflags! {
    /// Entry points provided by a loaded flash algorithm
    ///
    /// Packaged algorithms do not always ship every entry point (for
    /// example `UnInit` or `EraseChip` are optional in CMSIS packs), so the
    /// writer checks the reported set before opening a session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// `Init()` entry point
        const INIT             = 1 << 0;
        /// `UnInit()` entry point
        const UNINIT           = 1 << 1;
        /// `ProgramPage()` entry point
        const PROGRAM_PAGE     = 1 << 2;
        /// `EraseSector()` entry point
        const ERASE_SECTOR     = 1 << 3;
        /// `EraseChip()` entry point
        const ERASE_CHIP       = 1 << 4;
        /// Minimum program size can be queried per address
        const PAGE_SIZE        = 1 << 5;
        /// Erase sector size can be queried per address
        const SECTOR_SIZE      = 1 << 6;
        /// Busy state can be polled
        const BUSY_POLL        = 1 << 7;
        /// Algorithm can be switched per flash region (optional)
        const SELECT_ALGORITHM = 1 << 8;

        /// Everything the buffered writer needs
        const REQUIRED = Self::INIT.bits()
            | Self::UNINIT.bits()
            | Self::PROGRAM_PAGE.bits()
            | Self::ERASE_SECTOR.bits()
            | Self::ERASE_CHIP.bits()
            | Self::PAGE_SIZE.bits()
            | Self::SECTOR_SIZE.bits()
            | Self::BUSY_POLL.bits();
    }
}

/// Result of a flash algorithm entry point
pub type TargetResult = core::result::Result<(), TargetFault>;

/// Flash operations executed on the target through its loaded algorithm
///
/// All addresses are absolute target addresses. Sizes returned by the
/// geometry queries may differ between flash regions (banks with
/// different sector sizes); a return value of zero means the address is
/// not covered by the algorithm.
pub trait FlashAlgorithmTarget {
    /// Entry points provided by this algorithm
    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED
    }

    /// Run the algorithm's `Init()`
    fn init(&mut self) -> TargetResult;

    /// Run the algorithm's `UnInit()`
    fn uninit(&mut self) -> TargetResult;

    /// Program `data` starting at `addr`
    ///
    /// `addr` is aligned to the write block and the sector containing it
    /// has been erased.
    fn program_page(&mut self, addr: u32, data: &[u8]) -> TargetResult;

    /// Erase the sector starting at `addr`
    fn erase_sector(&mut self, addr: u32) -> TargetResult;

    /// Erase the whole flash
    fn erase_chip(&mut self) -> TargetResult;

    /// Minimum number of bytes a program operation accepts at `addr`
    fn program_page_min_size(&self, addr: u32) -> u32;

    /// Size of the erase sector containing `addr`
    fn erase_sector_size(&self, addr: u32) -> u32;

    /// Whether the flash controller is still busy
    fn flash_busy(&mut self) -> bool;

    /// Switch to the algorithm responsible for `addr`
    ///
    /// Only called when `capabilities()` contains `SELECT_ALGORITHM`.
    /// Addresses served by a different algorithm must be sector aligned.
    fn select_algorithm(&mut self, _addr: u32) -> TargetResult {
        Ok(())
    }
}
