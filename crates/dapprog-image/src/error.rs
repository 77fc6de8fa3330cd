//! Error types for image decoding

use std::path::PathBuf;
use thiserror::Error;

/// Image decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Failed to read the image file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A hex record could not be decoded
    #[error("invalid hex record {record}: {reason}")]
    Hex { record: usize, reason: String },

    /// Raw binary images carry no addresses of their own
    #[error("raw binary image requires a flash address")]
    MissingBaseAddress,

    /// Image data would extend past the 32-bit address space
    #[error("image data at 0x{addr:08X} ({len} bytes) exceeds the 32-bit address space")]
    AddressOverflow { addr: u32, len: usize },
}

/// Result type for image operations
pub type Result<T> = std::result::Result<T, ImageError>;
