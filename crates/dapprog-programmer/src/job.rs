//! Job execution

use std::path::PathBuf;
use std::time::{Duration, Instant};

use dapprog_core::loader::{AlgorithmLoader, LoadError};
use dapprog_core::{BufferedFlashWriter, FlashAlgorithmTarget};
use dapprog_image::{ImageError, ImageFeeder};
use thiserror::Error;

use crate::command::ProgrammingJob;
use crate::progress::Progress;

/// Errors that terminate an accepted job
#[derive(Debug, Error)]
pub enum JobError {
    /// The flash algorithm could not be loaded
    #[error("failed to load algorithm {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    /// The image could not be read or decoded
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Erasing or programming failed
    #[error("flash write failed: {0}")]
    Flash(#[from] dapprog_core::Error),
}

/// Summary of a finished job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    /// Image bytes written
    pub bytes: usize,
    /// Time from algorithm load to session close
    pub elapsed: Duration,
}

type DynTarget = dyn FlashAlgorithmTarget + Send;

/// Load the algorithm, then stream the image through a flash session
///
/// `progress` reaches 100 only if every write and the session close
/// succeeded. The loaded algorithm is released before returning, whether
/// the job succeeded or not.
pub fn run_job(
    job: &ProgrammingJob,
    loader: &mut dyn AlgorithmLoader,
    progress: &Progress,
) -> Result<JobReport, JobError> {
    let started = Instant::now();

    let mut algorithm = loader
        .load(&job.algorithm_path, job.ram_addr)
        .map_err(|source| JobError::Load {
            path: job.algorithm_path.clone(),
            source,
        })?;
    log::info!(
        "Programming {} using '{}'",
        job.program_path.display(),
        algorithm.config.name
    );

    let image = ImageFeeder::open(&job.program_path, job.kind, job.flash_addr)?;

    let mut writer: BufferedFlashWriter<'_, DynTarget> = BufferedFlashWriter::new();
    writer.init(algorithm.target.as_mut())?;

    let written = write_image(&mut writer, &image, progress);
    let closed = writer.uninit();
    let bytes = match (written, closed) {
        (Ok(bytes), Ok(())) => bytes,
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                log::warn!("Closing flash session also failed: {}", close_err);
            }
            return Err(e);
        }
        (Ok(_), Err(e)) => return Err(e.into()),
    };
    progress.complete();

    let elapsed = started.elapsed();
    log::info!(
        "Wrote {} bytes to '{}' in {:.3}s",
        bytes,
        algorithm.config.name,
        elapsed.as_secs_f64()
    );
    Ok(JobReport { bytes, elapsed })
}

fn write_image(
    writer: &mut BufferedFlashWriter<'_, DynTarget>,
    image: &ImageFeeder,
    progress: &Progress,
) -> Result<usize, JobError> {
    let total = image.total_size();
    let mut written = 0;

    for chunk in image.chunks() {
        let chunk = chunk?;
        writer.write(chunk.addr, &chunk.data)?;
        written += chunk.data.len();
        progress.update(written, total);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapprog_core::loader::{LoadedAlgorithm, TargetConfig};
    use dapprog_core::TargetOperation;
    use dapprog_dummy::{lock_flash, AlgorithmDescription, SimulatedTarget};
    use dapprog_image::ImageKind;
    use std::fs;
    use std::path::Path;

    const DEMO: &str = r#"
name = "Demo 64K"
flash_start = 0
flash_size = "64 KiB"
page_size = 256
ram_start = 0x2000_0000
ram_size = "20 KiB"

[[sectors]]
start = 0
size = "4 KiB"
"#;

    /// Hands out one prepared target
    struct OneShotLoader(Option<SimulatedTarget>);

    impl AlgorithmLoader for OneShotLoader {
        fn load(&mut self, _path: &Path, ram_addr: u32) -> Result<LoadedAlgorithm, LoadError> {
            let target = self.0.take().ok_or("already loaded")?;
            Ok(LoadedAlgorithm {
                config: target.description().target_config(ram_addr),
                target: Box::new(target),
            })
        }
    }

    fn bin_job(name: &str, data: &[u8], flash_addr: u32) -> ProgrammingJob {
        let dir = std::env::temp_dir().join(format!("dapprog-job-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let program_path = dir.join(name);
        fs::write(&program_path, data).unwrap();
        ProgrammingJob {
            algorithm_path: PathBuf::from("demo.toml"),
            program_path,
            ram_addr: 0x2000_0000,
            flash_addr: Some(flash_addr),
            kind: ImageKind::RawBinary,
        }
    }

    #[test]
    fn test_write_sector_range() {
        let target =
            SimulatedTarget::standalone(AlgorithmDescription::from_toml_str(DEMO).unwrap());
        let flash = target.flash();
        let mut loader = OneShotLoader(Some(target));
        let progress = Progress::new();

        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7) as u8).collect();
        let job = bin_job("range.bin", &data, 0x1000);
        let report = run_job(&job, &mut loader, &progress).unwrap();

        assert_eq!(report.bytes, 4096);
        assert_eq!(progress.get(), 100);
        let flash = lock_flash(&flash);
        assert_eq!(flash.read(0x1000, 4096).unwrap(), &data[..]);
        assert!(flash.read(0, 0x1000).unwrap().iter().all(|&b| b == 0xFF));
        assert!(flash.read(0x2000, 0x1000).unwrap().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_load_failure() {
        let mut loader = OneShotLoader(None);
        let progress = Progress::new();
        let job = bin_job("load.bin", &[0; 16], 0);
        assert!(matches!(
            run_job(&job, &mut loader, &progress),
            Err(JobError::Load { .. })
        ));
        assert_eq!(progress.get(), 0);
    }

    #[test]
    fn test_program_failure_keeps_progress_below_100() {
        let desc = format!("fail_at = 0x2100\n{DEMO}");
        let target =
            SimulatedTarget::standalone(AlgorithmDescription::from_toml_str(&desc).unwrap());
        let mut loader = OneShotLoader(Some(target));
        let progress = Progress::new();

        let job = bin_job("fail.bin", &[0x5A; 0x2000], 0x1000);
        let err = run_job(&job, &mut loader, &progress).unwrap_err();
        assert!(matches!(
            err,
            JobError::Flash(dapprog_core::Error::TargetOperationFailed {
                op: TargetOperation::EraseSector(0x2000),
                ..
            })
        ));
        assert!(progress.get() < 100);
    }

    #[test]
    fn test_missing_capability() {
        let desc = DEMO.replace(
            "page_size = 256",
            "page_size = 256\n\
             entry_points = [\"init\", \"uninit\", \"program_page\", \"erase_sector\"]",
        );
        let target =
            SimulatedTarget::standalone(AlgorithmDescription::from_toml_str(&desc).unwrap());
        let mut loader = OneShotLoader(Some(target));
        let job = bin_job("caps.bin", &[0; 16], 0);
        assert!(matches!(
            run_job(&job, &mut loader, &Progress::new()),
            Err(JobError::Flash(dapprog_core::Error::InvalidTarget { .. }))
        ));
    }

    #[test]
    fn test_target_config_passthrough() {
        let desc = AlgorithmDescription::from_toml_str(DEMO).unwrap();
        let cfg: TargetConfig = desc.target_config(0x2000_0800);
        assert_eq!(cfg.flash, 0..0x1_0000);
        assert_eq!(cfg.page_size, 256);
        assert_eq!(cfg.sector_size, 4096);
    }
}
