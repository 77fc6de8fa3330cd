//! Programming commands
//!
//! A command is a JSON object naming the flash algorithm and the program
//! image, both relative to the configured roots:
//!
//! ```json
//! {"algorithm": "stm32f4.toml", "program": "blinky.bin", "ram_addr": 536870912, "flash_addr": 134217728}
//! ```
//!
//! `ram_addr` is optional. `flash_addr` is required for raw binary
//! programs (`.bin`) and ignored for hex files.

use std::path::{Component, Path, PathBuf};

use dapprog_image::ImageKind;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ProgrammerConfig;

/// Reasons a command is rejected
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The command exceeds the configured size limit
    #[error("command is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    /// The command is not a JSON object with the expected fields
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A path is absolute or leaves its root directory
    #[error("path '{0}' must stay inside its root directory")]
    PathOutsideRoot(String),

    /// The algorithm file does not exist
    #[error("algorithm not found: {}", .0.display())]
    AlgorithmNotFound(PathBuf),

    /// The program file does not exist
    #[error("program not found: {}", .0.display())]
    ProgramNotFound(PathBuf),

    /// A raw binary program came without a flash address
    #[error("raw binary {} needs a flash_addr", .0.display())]
    MissingFlashAddress(PathBuf),
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    algorithm: String,
    program: String,
    #[serde(default)]
    ram_addr: Option<u32>,
    #[serde(default)]
    flash_addr: Option<u32>,
}

/// A validated programming job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammingJob {
    /// Algorithm package to load
    pub algorithm_path: PathBuf,
    /// Image to program
    pub program_path: PathBuf,
    /// RAM address the algorithm is loaded to
    pub ram_addr: u32,
    /// Flash address of a raw binary image
    pub flash_addr: Option<u32>,
    /// Image format
    pub kind: ImageKind,
}

impl ProgrammingJob {
    /// Parse a command and check it against the filesystem
    pub fn parse(command: &[u8], config: &ProgrammerConfig) -> Result<Self, ValidationError> {
        let raw: RawCommand = serde_json::from_slice(command)?;

        let algorithm_path = resolve(&config.algorithm_root, &raw.algorithm)?;
        if !algorithm_path.is_file() {
            return Err(ValidationError::AlgorithmNotFound(algorithm_path));
        }

        let program_path = resolve(&config.program_root, &raw.program)?;
        if !program_path.is_file() {
            return Err(ValidationError::ProgramNotFound(program_path));
        }

        let kind = ImageKind::from_path(&program_path);
        if kind == ImageKind::RawBinary && raw.flash_addr.is_none() {
            return Err(ValidationError::MissingFlashAddress(program_path));
        }

        Ok(Self {
            algorithm_path,
            program_path,
            ram_addr: raw.ram_addr.unwrap_or(config.default_ram_addr),
            flash_addr: raw.flash_addr,
            kind,
        })
    }
}

fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ValidationError> {
    let path = Path::new(relative);
    let inside = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || !inside {
        return Err(ValidationError::PathOutsideRoot(relative.to_string()));
    }
    Ok(root.join(path))
}
