//! Flash and submit commands

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use dapprog_dummy::{lock_flash, DescriptionLoader, SharedFlash};
use dapprog_programmer::{ProgrammerConfig, ProgrammingOrchestrator};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Command built from `flash` arguments
#[derive(Debug, Serialize)]
pub struct FlashRequest {
    /// Algorithm path relative to the algorithm root
    pub algorithm: String,
    /// Program path relative to the program root
    pub program: String,
    /// Algorithm load address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_addr: Option<u32>,
    /// Raw binary flash address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_addr: Option<u32>,
}

/// Program an image and optionally dump the resulting flash
pub fn run_flash(
    config: ProgrammerConfig,
    request: &FlashRequest,
    dump: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let command = serde_json::to_vec(request)?;
    let flash = execute(config, &command)?;

    if let Some(path) = dump {
        let flash = lock_flash(&flash);
        fs::write(path, flash.data())?;
        println!(
            "Dumped {} bytes from 0x{:08X} to {:?}",
            flash.data().len(),
            flash.base(),
            path
        );
    }

    Ok(())
}

/// Submit a raw JSON command, given inline or as `@FILE`
pub fn run_submit(
    config: ProgrammerConfig,
    command: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let command = match command.strip_prefix('@') {
        Some(path) => fs::read(path)?,
        None => command.as_bytes().to_vec(),
    };
    execute(config, &command)?;
    Ok(())
}

/// Run one job to completion and return the simulated flash
fn execute(
    config: ProgrammerConfig,
    command: &[u8],
) -> Result<SharedFlash, Box<dyn std::error::Error>> {
    let loader = DescriptionLoader::new();
    let flash = loader.flash();
    let orchestrator = ProgrammingOrchestrator::spawn(config, loader)?;

    log::debug!("Submitting {}", String::from_utf8_lossy(command));
    if !orchestrator.submit(command) {
        return Err(CommandError::Rejected.into());
    }

    let progress = wait_for_job(&orchestrator)?;
    if progress < 100 {
        return Err(CommandError::Failed(progress).into());
    }

    println!("Programming complete");
    Ok(flash)
}

/// Follow the running job until the orchestrator is idle
fn wait_for_job(orchestrator: &ProgrammingOrchestrator) -> Result<u8, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Programming");

    while orchestrator.is_busy() {
        pb.set_position(orchestrator.progress() as u64);
        thread::sleep(POLL_INTERVAL);
    }

    let progress = orchestrator.progress();
    pb.set_position(progress as u64);
    if progress == 100 {
        pb.finish_with_message("Done");
    } else {
        pb.abandon_with_message("Failed");
    }
    Ok(progress)
}
