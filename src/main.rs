//! dapprog - An in-circuit flash programmer
//!
//! The binary drives the programming engine against simulated targets
//! described by TOML algorithm files.
//!
//! # Architecture
//!
//! - `dapprog-core` writes an image through a flash algorithm with sector
//!   and page granularity
//! - `dapprog-image` decodes Intel HEX and raw binary images
//! - `dapprog-programmer` admits one job at a time and runs it on a worker
//! - `dapprog-dummy` provides the simulated algorithms and flash

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use dapprog_programmer::ProgrammerConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG still overrides the verbosity flags
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    let config = load_config(&cli)?;
    log::debug!("Using configuration {:?}", config);

    match cli.command {
        Commands::Flash {
            algorithm,
            program,
            ram_addr,
            flash_addr,
            dump,
        } => commands::run_flash(
            config,
            &commands::FlashRequest {
                algorithm,
                program,
                ram_addr,
                flash_addr,
            },
            dump.as_deref(),
        ),
        Commands::Submit { command } => commands::run_submit(config, &command),
        Commands::Info { algorithm } => commands::run_info(&config, &algorithm),
    }
}

/// Default log filter for the number of `-v` flags
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Load the configuration file, then apply command line overrides
fn load_config(cli: &Cli) -> Result<ProgrammerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ProgrammerConfig::from_file(path)?,
        None => ProgrammerConfig::default(),
    };

    if let Some(root) = &cli.algorithm_root {
        config.algorithm_root = root.clone();
    }
    if let Some(root) = &cli.program_root {
        config.program_root = root.clone();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(0), "info");
        assert_eq!(log_filter(1), "debug");
        assert_eq!(log_filter(2), "trace");
        assert_eq!(log_filter(5), "trace");
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::try_parse_from(["dapprog", "-vv", "info", "-a", "algo.toml"]).unwrap();
        assert_eq!(log_filter(cli.verbose), "trace");
        let cli = Cli::try_parse_from(["dapprog", "info", "-a", "algo.toml"]).unwrap();
        assert_eq!(log_filter(cli.verbose), "info");
    }
}
