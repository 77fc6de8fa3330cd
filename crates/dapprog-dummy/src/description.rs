//! Algorithm description files
//!
//! A description stands in for a packaged flash algorithm: it names the
//! entry points the algorithm provides and describes the flash and RAM
//! layout of the device.
//!
//! ```toml
//! name = "Demo 64K"
//! flash_start = 0x0800_0000
//! flash_size = "64 KiB"
//! page_size = 256
//! ram_start = 0x2000_0000
//! ram_size = "20 KiB"
//! blob_size = "4 KiB"
//! clock_hz = 8_000_000
//! entry_points = ["init", "uninit", "program_page", "erase_sector", "erase_chip", "busy"]
//!
//! # Each entry applies up to the start of the next one
//! [[sectors]]
//! start = 0x0800_0000
//! size = "4 KiB"
//! ```

use std::fs;
use std::ops::Range;
use std::path::Path;

use dapprog_core::loader::TargetConfig;
use dapprog_core::units::{deserialize_number, deserialize_opt_number, deserialize_size};
use dapprog_core::writer::round_up;
use dapprog_core::Capabilities;
use serde::Deserialize;

use crate::error::{DescriptionError, Result};

/// Entry point an algorithm may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// `Init()`
    Init,
    /// `UnInit()`
    Uninit,
    /// `ProgramPage()`
    ProgramPage,
    /// `EraseSector()`
    EraseSector,
    /// `EraseChip()`
    EraseChip,
    /// Busy polling
    Busy,
    /// Per-region algorithm switch
    SelectAlgorithm,
}

impl EntryPoint {
    fn capability(self) -> Capabilities {
        match self {
            EntryPoint::Init => Capabilities::INIT,
            EntryPoint::Uninit => Capabilities::UNINIT,
            EntryPoint::ProgramPage => Capabilities::PROGRAM_PAGE,
            EntryPoint::EraseSector => Capabilities::ERASE_SECTOR,
            EntryPoint::EraseChip => Capabilities::ERASE_CHIP,
            EntryPoint::Busy => Capabilities::BUSY_POLL,
            EntryPoint::SelectAlgorithm => Capabilities::SELECT_ALGORITHM,
        }
    }
}

/// A run of equally sized sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SectorRegion {
    /// Address of the first sector
    #[serde(deserialize_with = "deserialize_number")]
    pub start: u32,
    /// Size of each sector in the run
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u32,
}

/// Alignment of the algorithm stack in RAM
const STACK_ALIGN: u32 = 8;

fn default_blob_size() -> u32 {
    4096
}

fn default_clock_hz() -> u32 {
    8_000_000
}

fn default_entry_points() -> Vec<EntryPoint> {
    vec![
        EntryPoint::Init,
        EntryPoint::Uninit,
        EntryPoint::ProgramPage,
        EntryPoint::EraseSector,
        EntryPoint::EraseChip,
    ]
}

/// Description of a flash algorithm and the device it programs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlgorithmDescription {
    /// Algorithm name
    pub name: String,
    /// First flash address
    #[serde(deserialize_with = "deserialize_number")]
    pub flash_start: u32,
    /// Flash size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub flash_size: u32,
    /// Program page size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub page_size: u32,
    /// First RAM address
    #[serde(deserialize_with = "deserialize_number")]
    pub ram_start: u32,
    /// RAM size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub ram_size: u32,
    /// RAM needed by the algorithm code, data and stack
    #[serde(default = "default_blob_size", deserialize_with = "deserialize_size")]
    pub blob_size: u32,
    /// CPU clock the algorithm expects
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    /// Entry points the algorithm provides
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<EntryPoint>,
    /// Sector layout, sorted by address
    pub sectors: Vec<SectorRegion>,
    /// Erase or program touching this address fails (simulation only)
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub fail_at: Option<u32>,
}

impl AlgorithmDescription {
    /// Parse and validate a description from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let desc: Self = toml::from_str(s)?;
        desc.validate()?;
        Ok(desc)
    }

    /// Parse and validate a description file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| DescriptionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the layout for consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(DescriptionError::Invalid(msg)) };

        if self.page_size == 0 {
            return invalid("page_size must not be zero".into());
        }
        if self.flash_size == 0 || self.flash_start.checked_add(self.flash_size).is_none() {
            return invalid(format!(
                "flash 0x{:08X} + 0x{:X} is not a valid range",
                self.flash_start, self.flash_size
            ));
        }
        if self.ram_start.checked_add(self.ram_size).is_none() {
            return invalid("RAM range exceeds the 32-bit address space".into());
        }
        if self.blob_size > self.ram_size || self.blob_size > u32::MAX - STACK_ALIGN {
            return invalid(format!(
                "blob_size {} does not fit in {} bytes of RAM",
                self.blob_size, self.ram_size
            ));
        }
        match self.sectors.first() {
            None => return invalid("at least one sector region is required".into()),
            Some(first) if first.start != self.flash_start => {
                return invalid(format!(
                    "first sector region starts at 0x{:08X}, flash at 0x{:08X}",
                    first.start, self.flash_start
                ));
            }
            Some(_) => {}
        }

        let flash_end = self.flash_range().end;
        for (i, region) in self.sectors.iter().enumerate() {
            if region.size == 0 || region.size % self.page_size != 0 {
                return invalid(format!(
                    "sector size {} is not a multiple of the page size {}",
                    region.size, self.page_size
                ));
            }
            let end = self.sectors.get(i + 1).map_or(flash_end, |next| next.start);
            if end <= region.start || end > flash_end {
                return invalid(format!(
                    "sector region at 0x{:08X} is out of order or outside flash",
                    region.start
                ));
            }
            if (end - region.start) % region.size != 0 {
                return invalid(format!(
                    "sector region at 0x{:08X} is not a whole number of {} byte sectors",
                    region.start, region.size
                ));
            }
        }

        Ok(())
    }

    /// Capabilities of an algorithm built from this description
    pub fn capabilities(&self) -> Capabilities {
        self.entry_points
            .iter()
            .fold(
                Capabilities::PAGE_SIZE | Capabilities::SECTOR_SIZE | Capabilities::BUSY_POLL,
                |caps, ep| caps | ep.capability(),
            )
    }

    /// Flash address range
    pub fn flash_range(&self) -> Range<u32> {
        self.flash_start..self.flash_start + self.flash_size
    }

    /// RAM address range
    pub fn ram_range(&self) -> Range<u32> {
        self.ram_start..self.ram_start + self.ram_size
    }

    /// Size of the sector containing `addr`, or 0 outside flash
    pub fn sector_size(&self, addr: u32) -> u32 {
        if !self.flash_range().contains(&addr) {
            return 0;
        }
        self.sectors
            .iter()
            .rev()
            .find(|region| region.start <= addr)
            .map_or(0, |region| region.size)
    }

    /// Start of the sector containing `addr`
    pub fn sector_start(&self, addr: u32) -> Option<u32> {
        let region = self
            .sectors
            .iter()
            .rev()
            .find(|region| region.start <= addr)
            .filter(|_| self.flash_range().contains(&addr))?;
        Some(addr - (addr - region.start) % region.size)
    }

    /// Smallest sector size of the device
    pub fn min_sector_size(&self) -> u32 {
        self.sectors.iter().map(|r| r.size).min().unwrap_or(0)
    }

    /// Check that the algorithm fits into RAM at `ram_addr`
    pub fn check_load_address(&self, ram_addr: u32) -> Result<()> {
        let ram = self.ram_range();
        // Stack starts 8-byte aligned above the blob
        let footprint = round_up(self.blob_size, STACK_ALIGN);
        let fits = ram_addr >= ram.start && ram_addr as u64 + footprint as u64 <= ram.end as u64;
        if fits {
            Ok(())
        } else {
            Err(DescriptionError::RamOutOfRange {
                ram_addr,
                blob_size: self.blob_size,
                ram,
            })
        }
    }

    /// Target configuration for an algorithm loaded at `load_addr`
    pub fn target_config(&self, load_addr: u32) -> TargetConfig {
        TargetConfig {
            name: self.name.clone(),
            flash: self.flash_range(),
            ram: self.ram_range(),
            load_addr,
            clock_hz: self.clock_hz,
            page_size: self.page_size,
            sector_size: self.min_sector_size(),
        }
    }
}
