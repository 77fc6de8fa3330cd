//! Image feeding
//!
//! An `ImageFeeder` holds a decoded-on-demand firmware image and hands it
//! out as a stream of `(address, bytes)` chunks. The stream follows the
//! file order, which for hex images is not necessarily address order.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use ihex::{Reader, Record};

use crate::error::{ImageError, Result};

/// Chunk size used to split raw binary images
pub const BIN_CHUNK_SIZE: usize = 1024;

/// Image file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Intel HEX, self-describing addresses
    Hex,
    /// Raw binary, programmed at a caller supplied address
    RawBinary,
}

impl ImageKind {
    /// Guess the format from the file extension
    ///
    /// Files ending in `.bin` are raw binaries, everything else is parsed
    /// as Intel HEX.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bin") => ImageKind::RawBinary,
            _ => ImageKind::Hex,
        }
    }
}

/// A contiguous piece of image data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChunk<'a> {
    /// Absolute target address of the first byte
    pub addr: u32,
    /// Image bytes
    pub data: Cow<'a, [u8]>,
}

#[derive(Debug)]
enum Content {
    Hex(String),
    Binary { base: u32, data: Vec<u8> },
}

/// Firmware image ready to be streamed into a flash writer
#[derive(Debug)]
pub struct ImageFeeder {
    content: Content,
    total_size: usize,
}

impl ImageFeeder {
    /// Open the image at `path`
    ///
    /// `base` is the flash address of a raw binary and is ignored for hex
    /// images. Hex images are fully validated here so that a corrupt file
    /// is rejected before anything is erased.
    pub fn open(path: &Path, kind: ImageKind, base: Option<u32>) -> Result<Self> {
        let io_err = |source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        };

        let feeder = match kind {
            ImageKind::Hex => Self::from_hex(fs::read_to_string(path).map_err(io_err)?)?,
            ImageKind::RawBinary => {
                let base = base.ok_or(ImageError::MissingBaseAddress)?;
                Self::from_binary(base, fs::read(path).map_err(io_err)?)?
            }
        };

        log::debug!(
            "Opened {:?} image {} ({} bytes)",
            kind,
            path.display(),
            feeder.total_size
        );
        Ok(feeder)
    }

    /// Build a feeder from Intel HEX text
    pub fn from_hex(text: String) -> Result<Self> {
        let mut total_size = 0;
        for chunk in HexChunks::new(&text) {
            total_size += chunk?.data.len();
        }

        Ok(Self {
            content: Content::Hex(text),
            total_size,
        })
    }

    /// Build a feeder from raw bytes to be placed at `base`
    pub fn from_binary(base: u32, data: Vec<u8>) -> Result<Self> {
        if base as u64 + data.len() as u64 > 1 << 32 {
            return Err(ImageError::AddressOverflow {
                addr: base,
                len: data.len(),
            });
        }

        Ok(Self {
            total_size: data.len(),
            content: Content::Binary { base, data },
        })
    }

    /// Number of data bytes the image will write
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Stream the image as address/data chunks
    pub fn chunks(&self) -> Chunks<'_> {
        match &self.content {
            Content::Hex(text) => Chunks::Hex(HexChunks::new(text)),
            Content::Binary { base, data } => Chunks::Binary {
                base: *base,
                data,
                offset: 0,
            },
        }
    }
}

/// Iterator over the chunks of an image
pub enum Chunks<'a> {
    /// Chunks of a hex image, one per data record
    Hex(HexChunks<'a>),
    /// Chunks of a raw binary image
    Binary {
        /// Flash address of the first byte
        base: u32,
        /// Whole image
        data: &'a [u8],
        /// Offset of the next chunk
        offset: usize,
    },
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<ImageChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Chunks::Hex(chunks) => chunks.next(),
            Chunks::Binary { base, data, offset } => {
                if *offset >= data.len() {
                    return None;
                }
                let data: &'a [u8] = *data;
                let len = BIN_CHUNK_SIZE.min(data.len() - *offset);
                let chunk = ImageChunk {
                    addr: *base + *offset as u32,
                    data: Cow::Borrowed(&data[*offset..*offset + len]),
                };
                *offset += len;
                Some(Ok(chunk))
            }
        }
    }
}

/// Data records of an Intel HEX image with absolute addresses
pub struct HexChunks<'a> {
    reader: Reader<'a>,
    upper: u32,
    record: usize,
    done: bool,
}

impl<'a> HexChunks<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            reader: Reader::new(text),
            upper: 0,
            record: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for HexChunks<'a> {
    type Item = Result<ImageChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.record += 1;
            let record = match self.reader.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ImageError::Hex {
                        record: self.record,
                        reason: e.to_string(),
                    }));
                }
            };

            match record {
                Record::Data { offset, value } => {
                    let addr = self.upper + offset as u32;
                    if addr as u64 + value.len() as u64 > 1 << 32 {
                        self.done = true;
                        return Some(Err(ImageError::AddressOverflow {
                            addr,
                            len: value.len(),
                        }));
                    }
                    return Some(Ok(ImageChunk {
                        addr,
                        data: Cow::Owned(value),
                    }));
                }
                Record::ExtendedLinearAddress(upper) => self.upper = (upper as u32) << 16,
                Record::ExtendedSegmentAddress(segment) => self.upper = (segment as u32) << 4,
                Record::EndOfFile => {
                    self.done = true;
                    return None;
                }
                // Entry points are irrelevant for flashing
                Record::StartLinearAddress(_) | Record::StartSegmentAddress { .. } => {}
            }
        }
    }
}
