//! Error types for dapprog-core
//!
//! This module provides a no_std compatible error type shared by the
//! write engine and every flash algorithm target.

use core::fmt;

use crate::target::Capabilities;

/// Failure code reported by a flash algorithm entry point
///
/// Flash algorithms return a non-zero status word on failure. The value is
/// algorithm specific and only useful for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetFault(pub u32);

impl fmt::Display for TargetFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status 0x{:08X}", self.0)
    }
}

/// The target operation that reported a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOperation {
    /// Algorithm `Init()`
    Init,
    /// Algorithm `UnInit()`
    Uninit,
    /// Sector erase at the given address
    EraseSector(u32),
    /// Page program at the given address
    ProgramPage(u32),
    /// Per-region algorithm selection at the given address
    SelectAlgorithm(u32),
}

impl fmt::Display for TargetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Uninit => write!(f, "uninit"),
            Self::EraseSector(addr) => write!(f, "erase sector at 0x{:08X}", addr),
            Self::ProgramPage(addr) => write!(f, "program page at 0x{:08X}", addr),
            Self::SelectAlgorithm(addr) => write!(f, "select algorithm for 0x{:08X}", addr),
        }
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Session misuse
    /// A write session is already open
    AlreadyOpen,
    /// No write session is open (or it failed and must be closed first)
    NotOpen,

    // Target errors
    /// The target is missing entry points the writer requires
    InvalidTarget {
        /// Capabilities that were required but not reported
        missing: Capabilities,
    },
    /// The target reported a zero page or sector size
    GeometryError {
        /// Address the geometry was queried for
        addr: u32,
        /// Reported minimum program size
        page_size: u32,
        /// Reported erase sector size
        sector_size: u32,
    },
    /// A flash algorithm entry point reported failure
    TargetOperationFailed {
        /// Which operation failed
        op: TargetOperation,
        /// Status reported by the algorithm
        fault: TargetFault,
    },
}

impl Error {
    /// Build a `TargetOperationFailed` error
    pub fn target(op: TargetOperation, fault: TargetFault) -> Self {
        Self::TargetOperationFailed { op, fault }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOpen => write!(f, "flash session already open"),
            Self::NotOpen => write!(f, "flash session not open"),
            Self::InvalidTarget { missing } => {
                write!(f, "flash algorithm is missing entry points: {:?}", missing)
            }
            Self::GeometryError {
                addr,
                page_size,
                sector_size,
            } => write!(
                f,
                "invalid flash geometry at 0x{:08X}: page size {}, sector size {}",
                addr, page_size, sector_size
            ),
            Self::TargetOperationFailed { op, fault } => {
                write!(f, "target operation failed: {} ({})", op, fault)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
