//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    dapprog_core::units::parse_number(s)
}

#[derive(Parser)]
#[command(name = "dapprog")]
#[command(author, version, about = "In-circuit flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Programmer configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory algorithm paths are resolved against
    #[arg(long, global = true)]
    pub algorithm_root: Option<PathBuf>,

    /// Directory program paths are resolved against
    #[arg(long, global = true)]
    pub program_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Program an image into the simulated target
    Flash {
        /// Algorithm description, relative to the algorithm root
        #[arg(short, long)]
        algorithm: String,

        /// Image file (.hex or .bin), relative to the program root
        #[arg(short, long)]
        program: String,

        /// RAM address to load the algorithm to (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        ram_addr: Option<u32>,

        /// Flash address of a raw binary image (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        flash_addr: Option<u32>,

        /// Write the resulting flash contents to this file
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Submit a raw JSON command
    Submit {
        /// JSON command, or @FILE to read it from a file
        command: String,
    },

    /// Show the layout described by an algorithm file
    Info {
        /// Algorithm description, relative to the algorithm root
        #[arg(short, long)]
        algorithm: String,
    },
}
