//! dapprog-image - Firmware image decoding
//!
//! Decodes firmware image files into the `(address, bytes)` stream that the
//! flash writer consumes:
//!
//! - **Intel HEX** - addresses come from the file (extended linear and
//!   extended segment addressing are supported)
//! - **Raw binary** - the whole file is placed at a caller supplied address

mod error;
mod feeder;

pub use error::{ImageError, Result};
pub use feeder::{Chunks, HexChunks, ImageChunk, ImageFeeder, ImageKind, BIN_CHUNK_SIZE};
