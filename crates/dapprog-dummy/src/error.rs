//! Error types for the simulated target

use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

/// Errors loading an algorithm description
#[derive(Debug, Error)]
pub enum DescriptionError {
    /// Failed to read the description file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The description is not valid TOML or misses fields
    #[error("failed to parse algorithm description: {0}")]
    Parse(#[from] toml::de::Error),

    /// The description is inconsistent
    #[error("invalid algorithm description: {0}")]
    Invalid(String),

    /// The algorithm does not fit into target RAM at the requested address
    #[error(
        "algorithm ({blob_size} bytes) does not fit in RAM 0x{:08X}..0x{:08X} at 0x{ram_addr:08X}",
        .ram.start, .ram.end
    )]
    RamOutOfRange {
        ram_addr: u32,
        blob_size: u32,
        ram: Range<u32>,
    },
}

/// Result type for description operations
pub type Result<T> = std::result::Result<T, DescriptionError>;
