//! Programmer configuration
//!
//! ```toml
//! algorithm_root = "/srv/dapprog/algorithms"
//! program_root = "/srv/dapprog/programs"
//! default_ram_addr = "0x2000_0000"
//! max_command_len = 1024
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};

use dapprog_core::units::{deserialize_number, deserialize_size};
use serde::Deserialize;
use thiserror::Error;

/// Default load address of flash algorithms
pub const DEFAULT_RAM_ADDR: u32 = 0x2000_0000;

/// Default maximum size of a submitted command
pub const DEFAULT_MAX_COMMAND_LEN: u32 = 1024;

/// Errors loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown fields
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of a `ProgrammingOrchestrator`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgrammerConfig {
    /// Directory algorithm paths are resolved against
    pub algorithm_root: PathBuf,
    /// Directory program paths are resolved against
    pub program_root: PathBuf,
    /// RAM address used when a command has no `ram_addr`
    #[serde(deserialize_with = "deserialize_number")]
    pub default_ram_addr: u32,
    /// Longest command accepted, in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub max_command_len: u32,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            algorithm_root: PathBuf::from("algorithms"),
            program_root: PathBuf::from("programs"),
            default_ram_addr: DEFAULT_RAM_ADDR,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
        }
    }
}

impl ProgrammerConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_command_len == 0 {
            return Err(ConfigError::Invalid("max_command_len must not be zero".into()));
        }
        Ok(())
    }
}
