//! Encoder child lifecycle
//!
//! One sequential loop owns the child: sample the config, bump the stream
//! epoch, spawn ffmpeg, drain its stdout through the de-muxer to EOF, reap,
//! repeat. Restart requests kill the running child, which closes stdout and
//! lets the loop come back around - two encoder instances can never overlap
//! because the next spawn waits on the previous drain.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::args::build_args;
use super::ivf::demux;
use super::EpochCounter;
use crate::config::ConfigRegistry;
use crate::error::{AppError, Result};
use crate::stream::FrameFanout;

/// Minimum spacing between spawn attempts; bounds crash-loop cost
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

const BUNDLED_FFMPEG: &str = "/app/bin/ffmpeg";

/// Prefer the bundled ffmpeg, fall back to `PATH`.
pub fn locate_ffmpeg() -> PathBuf {
    let bundled = Path::new(BUNDLED_FFMPEG);
    if bundled.exists() {
        bundled.to_path_buf()
    } else {
        warn!("{} not found, relying on system PATH", BUNDLED_FFMPEG);
        PathBuf::from("ffmpeg")
    }
}

/// Capture source description for one supervisor
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    /// `DISPLAY` value for the child environment, e.g. `:99`
    pub display: String,
    /// x11grab input spec naming the screen, e.g. `:99.0`
    pub grab_input: String,
    /// Replace screen capture with a synthetic source
    pub test_pattern: bool,
}

/// Supervisor for the encoder child process
pub struct EncoderSupervisor {
    registry: Arc<ConfigRegistry>,
    fanout: Arc<FrameFanout>,
    epochs: Arc<EpochCounter>,
    target: CaptureTarget,
    ffmpeg_path: PathBuf,
    child: Mutex<Option<tokio::process::Child>>,
    should_run: AtomicBool,
}

impl EncoderSupervisor {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        fanout: Arc<FrameFanout>,
        epochs: Arc<EpochCounter>,
        target: CaptureTarget,
    ) -> Arc<Self> {
        Self::with_path(registry, fanout, epochs, target, locate_ffmpeg())
    }

    fn with_path(
        registry: Arc<ConfigRegistry>,
        fanout: Arc<FrameFanout>,
        epochs: Arc<EpochCounter>,
        target: CaptureTarget,
        ffmpeg_path: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            fanout,
            epochs,
            target,
            ffmpeg_path,
            child: Mutex::new(None),
            should_run: AtomicBool::new(true),
        })
    }

    /// Start the supervisor loop and the restart-signal listener.
    pub fn spawn(self: Arc<Self>, restart_rx: mpsc::Receiver<()>) {
        let sup = self.clone();
        tokio::spawn(async move { sup.kill_listener(restart_rx).await });

        tokio::spawn(async move { self.run_loop().await });
    }

    /// Stop the loop and kill any running child.
    pub async fn shutdown(&self) {
        self.should_run.store(false, Ordering::SeqCst);
        info!("killing encoder (shutdown)");
        self.kill_current().await;
    }

    fn should_run(&self) -> bool {
        self.should_run.load(Ordering::SeqCst)
    }

    /// Translate restart signals into a kill of the running child. The
    /// loop notices the resulting EOF and respawns with a fresh snapshot.
    async fn kill_listener(self: Arc<Self>, mut restart_rx: mpsc::Receiver<()>) {
        while restart_rx.recv().await.is_some() {
            if !self.should_run() {
                break;
            }
            info!("configuration changed, restarting encoder");
            self.kill_current().await;
        }
    }

    async fn kill_current(&self) {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("encoder kill failed: {}", e);
            }
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let mut last_attempt: Option<Instant> = None;
        loop {
            if !self.should_run() {
                break;
            }
            if let Some(at) = last_attempt {
                let since = at.elapsed();
                if since < RESTART_BACKOFF {
                    tokio::time::sleep(RESTART_BACKOFF - since).await;
                }
            }
            if !self.should_run() {
                break;
            }

            last_attempt = Some(Instant::now());
            if let Err(e) = self.run_once().await {
                warn!("encoder pipeline: {}", e);
            }
        }
        info!("encoder supervisor stopped");
    }

    /// One full encoder run: spawn, drain to EOF, reap.
    async fn run_once(&self) -> Result<()> {
        let snapshot = self.registry.snapshot();
        let epoch = self.epochs.bump();
        let args = build_args(&snapshot, &self.target.grab_input, self.target.test_pattern);

        info!(
            epoch,
            "starting encoder: {}x{} @ {} fps",
            snapshot.screen.width,
            snapshot.screen.height,
            snapshot.encoder.fps
        );
        debug!("encoder args: {}", args.join(" "));

        let mut child = match Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("DISPLAY", &self.target.display)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("encoder binary {} not found: {}", self.ffmpeg_path.display(), e);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Encoder("encoder child has no stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, epoch));
        }

        *self.child.lock().await = Some(child);

        // A config change between the snapshot above and the child store
        // has its signal consumed while no child existed; catch it here so
        // the stale instance dies instead of outliving the change.
        if self.registry.snapshot() != snapshot {
            self.kill_current().await;
        }

        let demux_result = demux(BufReader::new(stdout), epoch, &self.fanout).await;

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match child.wait().await {
                Ok(status) => info!(epoch, "encoder exited: {}", status),
                Err(e) => warn!(epoch, "encoder wait failed: {}", e),
            }
        }

        demux_result
    }
}

/// Forward the child's stderr line by line for observability.
async fn log_stderr<R: tokio::io::AsyncRead + Unpin>(stderr: R, epoch: u32) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(epoch, "encoder: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(epoch, "encoder stderr read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigUpdate;
    use crate::encoder::ivf::{IVF_HEADER_LEN, IVF_MAGIC};
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn epochs_increase_monotonically() {
        let epochs = EpochCounter::new();
        assert_eq!(epochs.current(), 0);
        assert_eq!(epochs.bump(), 1);
        assert_eq!(epochs.bump(), 2);
        assert_eq!(epochs.current(), 2);
    }

    /// Stub encoder: emits a fixed IVF stream, then keeps stdout open
    /// until killed, like a live capture would.
    fn write_stub_encoder(dir: &Path) -> PathBuf {
        let mut data = Vec::new();
        data.extend_from_slice(IVF_MAGIC);
        data.resize(IVF_HEADER_LEN, 0);
        for payload in [b"one".as_slice(), b"two".as_slice()] {
            data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&[0u8; 8]);
            data.extend_from_slice(payload);
        }
        let data_path = dir.join("stream.ivf");
        std::fs::write(&data_path, &data).unwrap();

        let script_path = dir.join("encoder.sh");
        let script = format!("#!/bin/sh\ncat {}\nexec sleep 30\n", data_path.display());
        std::fs::write(&script_path, script).unwrap();
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        script_path
    }

    #[tokio::test]
    async fn restart_signal_replaces_the_child_and_bumps_the_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = write_stub_encoder(dir.path());

        let (registry, restart_rx) = ConfigRegistry::new(30);
        let (fanout, mut pacing_rx) = FrameFanout::new();
        let epochs = Arc::new(EpochCounter::new());
        let supervisor = EncoderSupervisor::with_path(
            registry.clone(),
            fanout,
            epochs,
            CaptureTarget {
                display: ":0".into(),
                grab_input: ":0.0".into(),
                test_pattern: true,
            },
            script_path,
        );
        supervisor.clone().spawn(restart_rx);

        let first = tokio::time::timeout(Duration::from_secs(5), pacing_rx.recv())
            .await
            .expect("first frame in time")
            .expect("first frame");
        assert_eq!(first.epoch, 1);
        assert_eq!(&first.data[..], b"one");

        // A config change kills the child; the loop respawns it under the
        // next epoch after the back-off.
        assert!(registry.apply(&ConfigUpdate {
            bandwidth: Some(1),
            ..Default::default()
        }));

        let restarted = loop {
            let frame = tokio::time::timeout(Duration::from_secs(10), pacing_rx.recv())
                .await
                .expect("frame after restart in time")
                .expect("frame after restart");
            if frame.epoch > 1 {
                break frame;
            }
        };
        assert_eq!(restarted.epoch, 2);
        assert_eq!(&restarted.data[..], b"one");

        supervisor.shutdown().await;
    }
}
