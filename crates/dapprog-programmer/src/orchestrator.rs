//! Single-worker job orchestration
//!
//! The orchestrator owns one worker thread that owns the algorithm loader.
//! `submit` hands a command to the worker and waits only for the
//! accept/reject decision; the job itself runs in the background while
//! callers poll `is_busy` and `progress`.
//!
//! At most one job exists at any time. The busy flag is claimed before a
//! command is handed over, so a submission arriving while a job is being
//! admitted or executed is rejected rather than queued.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dapprog_core::loader::AlgorithmLoader;
use tokio::sync::{mpsc, oneshot};

use crate::command::{ProgrammingJob, ValidationError};
use crate::config::ProgrammerConfig;
use crate::job::run_job;
use crate::progress::Progress;

/// State shared between the handle and the worker
#[derive(Debug, Default)]
struct Shared {
    busy: AtomicBool,
    progress: Progress,
}

impl Shared {
    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

struct Request {
    command: Vec<u8>,
    reply: oneshot::Sender<bool>,
}

struct Worker<L> {
    config: ProgrammerConfig,
    loader: L,
    shared: Arc<Shared>,
    requests: mpsc::Receiver<Request>,
}

impl<L: AlgorithmLoader> Worker<L> {
    fn run(mut self) {
        log::debug!("Programming worker started");
        while let Some(request) = self.requests.blocking_recv() {
            self.handle(request);
        }
        log::debug!("Programming worker stopped");
    }

    fn handle(&mut self, request: Request) {
        let job = match ProgrammingJob::parse(&request.command, &self.config) {
            Ok(job) => job,
            Err(e) => {
                log::warn!("Rejected command: {}", e);
                self.shared.release();
                let _ = request.reply.send(false);
                return;
            }
        };

        self.shared.progress.reset();
        let _ = request.reply.send(true);

        match run_job(&job, &mut self.loader, &self.shared.progress) {
            Ok(report) => log::debug!("Job finished after {:?}", report.elapsed),
            Err(e) => log::error!("Programming {} failed: {}", job.program_path.display(), e),
        }
        self.shared.release();
    }
}

/// Accepts programming commands and runs them one at a time
pub struct ProgrammingOrchestrator {
    shared: Arc<Shared>,
    requests: Option<mpsc::Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    max_command_len: usize,
}

impl ProgrammingOrchestrator {
    /// Start the worker thread
    ///
    /// The worker owns `loader` until the orchestrator is dropped.
    pub fn spawn<L>(config: ProgrammerConfig, loader: L) -> io::Result<Self>
    where
        L: AlgorithmLoader + Send + 'static,
    {
        // The busy flag admits one request at a time
        let (tx, rx) = mpsc::channel(1);
        let shared = Arc::new(Shared::default());
        let max_command_len = config.max_command_len as usize;

        let worker = Worker {
            config,
            loader,
            shared: Arc::clone(&shared),
            requests: rx,
        };
        let handle = thread::Builder::new()
            .name("dapprog-worker".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            requests: Some(tx),
            worker: Some(handle),
            max_command_len,
        })
    }

    /// Submit a command
    ///
    /// Returns `true` if the command was accepted and its job started,
    /// `false` if it was rejected or a job is already running. Blocks only
    /// until the worker has decided.
    pub fn submit(&self, command: &[u8]) -> bool {
        if command.len() > self.max_command_len {
            log::warn!(
                "Rejected command: {}",
                ValidationError::TooLong {
                    len: command.len(),
                    max: self.max_command_len,
                }
            );
            return false;
        }

        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Rejected command: a job is already running");
            return false;
        }

        let Some(requests) = &self.requests else {
            self.shared.release();
            return false;
        };

        let (reply, decision) = oneshot::channel();
        let request = Request {
            command: command.to_vec(),
            reply,
        };
        if requests.blocking_send(request).is_err() {
            log::error!("Programming worker is gone");
            self.shared.release();
            return false;
        }

        match decision.blocking_recv() {
            Ok(accepted) => accepted,
            Err(_) => {
                log::error!("Programming worker dropped the command");
                self.shared.release();
                false
            }
        }
    }

    /// Whether a job is being admitted or executed
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Progress of the current or last job in percent
    pub fn progress(&self) -> u8 {
        self.shared.progress.get()
    }
}

impl Drop for ProgrammingOrchestrator {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the current job
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Programming worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapprog_core::loader::{LoadError, LoadedAlgorithm};
    use dapprog_dummy::{lock_flash, DescriptionLoader, SharedFlash};
    use ihex::Record;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    const DEMO: &str = r#"
name = "Demo 64K"
flash_start = 0
flash_size = "64 KiB"
page_size = 256
ram_start = 0x2000_0000
ram_size = "20 KiB"
blob_size = "4 KiB"
entry_points = ["init", "uninit", "program_page", "erase_sector", "erase_chip", "busy"]

[[sectors]]
start = 0
size = "4 KiB"
"#;

    /// Counts loads and can hold each one until released
    struct TestLoader {
        inner: DescriptionLoader,
        loads: Arc<AtomicUsize>,
        gate: Option<std_mpsc::Receiver<()>>,
    }

    impl AlgorithmLoader for TestLoader {
        fn load(&mut self, path: &Path, ram_addr: u32) -> Result<LoadedAlgorithm, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.recv()?;
            }
            self.inner.load(path, ram_addr)
        }
    }

    struct Fixture {
        dir: PathBuf,
        orchestrator: Option<ProgrammingOrchestrator>,
        flash: SharedFlash,
        loads: Arc<AtomicUsize>,
        gate: Option<std_mpsc::Sender<()>>,
    }

    impl Fixture {
        fn new(name: &str, gated: bool) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("dapprog-orch-{}-{}", name, std::process::id()));
            let config = ProgrammerConfig {
                algorithm_root: dir.join("algorithms"),
                program_root: dir.join("programs"),
                ..ProgrammerConfig::default()
            };
            fs::create_dir_all(&config.algorithm_root).unwrap();
            fs::create_dir_all(&config.program_root).unwrap();
            fs::write(config.algorithm_root.join("demo.toml"), DEMO).unwrap();
            fs::write(
                config.algorithm_root.join("faulty.toml"),
                format!("fail_at = 0x1800\n{DEMO}"),
            )
            .unwrap();

            let (gate_tx, gate_rx) = std_mpsc::channel();
            let inner = DescriptionLoader::new();
            let flash = inner.flash();
            let loads = Arc::new(AtomicUsize::new(0));
            let loader = TestLoader {
                inner,
                loads: Arc::clone(&loads),
                gate: gated.then_some(gate_rx),
            };

            Self {
                orchestrator: Some(ProgrammingOrchestrator::spawn(config, loader).unwrap()),
                dir,
                flash,
                loads,
                gate: gated.then_some(gate_tx),
            }
        }

        fn orch(&self) -> &ProgrammingOrchestrator {
            self.orchestrator.as_ref().unwrap()
        }

        fn add_program(&self, name: &str, content: &[u8]) {
            fs::write(self.dir.join("programs").join(name), content).unwrap();
        }

        fn release(&self) {
            self.gate.as_ref().unwrap().send(()).unwrap();
        }

        fn wait_idle(&self) {
            let deadline = Instant::now() + Duration::from_secs(10);
            while self.orch().is_busy() {
                assert!(Instant::now() < deadline, "job did not finish");
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn read_flash(&self, addr: u32, len: usize) -> Vec<u8> {
            lock_flash(&self.flash).read(addr, len).unwrap().to_vec()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            // Unblock a held job before joining the worker
            self.gate.take();
            self.orchestrator.take();
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn hex_image(records: &[Record]) -> String {
        ihex::create_object_file_representation(records).unwrap()
    }

    #[test]
    fn test_idle_state() {
        let fx = Fixture::new("idle", false);
        assert!(!fx.orch().is_busy());
        assert_eq!(fx.orch().progress(), 0);
    }

    #[test]
    fn test_binary_job() {
        let fx = Fixture::new("bin", false);
        let data: Vec<u8> = (0..4096u32).map(|i| (i ^ (i >> 8)) as u8).collect();
        fx.add_program("app.bin", &data);

        assert!(fx.orch().submit(
            br#"{"algorithm": "demo.toml", "program": "app.bin", "flash_addr": 4096}"#
        ));
        fx.wait_idle();

        assert_eq!(fx.orch().progress(), 100);
        assert_eq!(fx.loads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.read_flash(0x1000, 4096), data);
        assert!(fx.read_flash(0, 0x1000).iter().all(|&b| b == 0xFF));
        assert!(fx.read_flash(0x2000, 0x1000).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_hex_job() {
        let fx = Fixture::new("hex", false);
        let hex = hex_image(&[
            Record::ExtendedLinearAddress(0),
            Record::Data {
                offset: 0x3000,
                value: vec![0xDE, 0xAD, 0xBE, 0xEF],
            },
            Record::Data {
                offset: 0x0100,
                value: vec![0x01, 0x02],
            },
            Record::EndOfFile,
        ]);
        fx.add_program("app.hex", hex.as_bytes());

        assert!(fx
            .orch()
            .submit(br#"{"algorithm": "demo.toml", "program": "app.hex"}"#));
        fx.wait_idle();

        assert_eq!(fx.orch().progress(), 100);
        assert_eq!(fx.read_flash(0x3000, 4), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(fx.read_flash(0x0100, 2), vec![0x01, 0x02]);
        assert_eq!(fx.read_flash(0x0102, 2), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_reject_while_busy() {
        let fx = Fixture::new("busy", true);
        fx.add_program("app.bin", &[0x11; 512]);
        let command = br#"{"algorithm": "demo.toml", "program": "app.bin", "flash_addr": 0}"#;

        assert!(fx.orch().submit(command));
        assert!(fx.orch().is_busy());
        let before = fx.orch().progress();

        assert!(!fx.orch().submit(command));
        assert!(fx.orch().is_busy());
        assert_eq!(fx.orch().progress(), before);

        fx.release();
        fx.wait_idle();
        assert_eq!(fx.orch().progress(), 100);
        assert_eq!(fx.loads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.read_flash(0, 512), vec![0x11; 512]);
    }

    #[test]
    fn test_invalid_commands_never_load() {
        let fx = Fixture::new("invalid", false);
        fx.add_program("app.bin", &[0; 16]);

        for command in [
            &br#"{"algorithm": "demo.toml"}"#[..],
            br#"{"algorithm": "missing.toml", "program": "app.bin", "flash_addr": 0}"#,
            br#"{"algorithm": "demo.toml", "program": "missing.hex"}"#,
            br#"{"algorithm": "demo.toml", "program": "app.bin"}"#,
            b"garbage",
        ] {
            assert!(!fx.orch().submit(command));
            assert!(!fx.orch().is_busy());
        }

        assert_eq!(fx.loads.load(Ordering::SeqCst), 0);
        assert_eq!(fx.orch().progress(), 0);
    }

    #[test]
    fn test_reject_oversized_command() {
        let fx = Fixture::new("long", false);
        let mut command = br#"{"algorithm": "demo.toml", "program": "app.bin", "pad": ""#.to_vec();
        command.resize(2000, b'x');
        command.extend_from_slice(b"\"}");
        assert!(!fx.orch().submit(&command));
        assert!(!fx.orch().is_busy());
    }

    #[test]
    fn test_failed_job_progress() {
        let fx = Fixture::new("fault", false);
        fx.add_program("app.bin", &[0x22; 0x2000]);

        // Completed job leaves 100 behind, a rejected command keeps it
        assert!(fx.orch().submit(
            br#"{"algorithm": "demo.toml", "program": "app.bin", "flash_addr": 0}"#
        ));
        fx.wait_idle();
        assert_eq!(fx.orch().progress(), 100);
        assert!(!fx.orch().submit(b"{}"));
        assert_eq!(fx.orch().progress(), 100);

        // Erasing the sector at 0x1000 fails
        assert!(fx.orch().submit(
            br#"{"algorithm": "faulty.toml", "program": "app.bin", "flash_addr": 0}"#
        ));
        fx.wait_idle();
        assert!(fx.orch().progress() < 100);
        assert_eq!(fx.loads.load(Ordering::SeqCst), 2);

        // The worker keeps serving after a failure
        assert!(fx.orch().submit(
            br#"{"algorithm": "demo.toml", "program": "app.bin", "flash_addr": 0}"#
        ));
        fx.wait_idle();
        assert_eq!(fx.orch().progress(), 100);
    }

    #[test]
    fn test_drop_waits_for_job() {
        let mut fx = Fixture::new("drop", true);
        fx.add_program("app.bin", &[0x33; 256]);
        assert!(fx.orch().submit(
            br#"{"algorithm": "demo.toml", "program": "app.bin", "flash_addr": 256}"#
        ));
        fx.release();
        fx.orchestrator.take();
        assert_eq!(fx.read_flash(256, 256), vec![0x33; 256]);
    }
}
