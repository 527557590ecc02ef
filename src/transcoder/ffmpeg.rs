use super::args::HlsArgs;
use super::handle::{exit_channel, ExitPublisher, ExitReport, ProcessHandle};
use super::Transcoder;
use crate::config::TranscoderConfig;
use crate::error::{RelayError, Result};
use crate::venue::VenueId;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Extra time `ProcessHandle::stop` allows on top of the grace period for the kill to land
const KILL_MARGIN: Duration = Duration::from_secs(2);

/// Spawns ffmpeg to segment live PCM into HLS
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn start(&self, venue: &VenueId, output_dir: &Path) -> Result<ProcessHandle> {
        let args = HlsArgs::new(&self.config, output_dir);

        let mut child = Command::new(&self.config.program)
            .args(args.to_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RelayError::Spawn)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RelayError::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "transcoder stdin was not captured",
            ))
        })?;

        let label = match child.id() {
            Some(pid) => format!("ffmpeg[{}]", pid),
            None => "ffmpeg".to_string(),
        };

        info!(
            venue = %venue,
            "Started {} writing {}",
            label,
            args.manifest_path().display()
        );

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_diagnostics(venue.clone(), label.clone(), stderr));
        }

        let (exit_tx, exit) = exit_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let grace = self.config.stop_grace();

        tokio::spawn(supervise(child, label.clone(), stop_rx, exit_tx, grace));

        Ok(ProcessHandle::new(
            label,
            Box::new(stdin),
            exit,
            stop_tx,
            self.config.write_timeout(),
            grace + KILL_MARGIN,
        ))
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Wait for the process to exit on its own, or terminate it once stop is requested
async fn supervise(
    mut child: Child,
    label: String,
    stop_rx: oneshot::Receiver<()>,
    exit_tx: ExitPublisher,
    grace: Duration,
) {
    let mut forced = false;

    let status = tokio::select! {
        status = child.wait() => status,
        // Also fires if the handle was dropped without stopping
        _ = stop_rx => {
            interrupt(&child, &label);
            match timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("{} still running after {:?}, killing", label, grace);
                    forced = true;
                    if let Err(e) = child.start_kill() {
                        error!("{}: kill failed: {}", label, e);
                    }
                    child.wait().await
                }
            }
        }
    };

    let report = match status {
        Ok(status) => ExitReport {
            code: status.code(),
            forced,
        },
        Err(e) => {
            error!("{}: failed to wait for exit: {}", label, e);
            ExitReport {
                code: None,
                forced,
            }
        }
    };

    info!("{} exited ({})", label, report);
    let _ = exit_tx.send(Some(report));
}

/// SIGINT makes ffmpeg flush the last segment and exit on its own
#[cfg(unix)]
fn interrupt(child: &Child, label: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    match i32::try_from(pid) {
        Ok(pid) => {
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGINT) {
                debug!("{}: interrupt failed: {}", label, e);
            }
        }
        Err(_) => warn!("{}: pid {} out of range, not interrupting", label, pid),
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child, label: &str) {
    debug!("{}: no interrupt on this platform, relying on end of input", label);
}

/// ffmpeg runs with `-loglevel warning`, so anything on stderr is worth surfacing
async fn forward_diagnostics(venue: VenueId, label: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    warn!(target: "transcoder", venue = %venue, "{}: {}", label, line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: "transcoder", venue = %venue, "{}: stderr read error: {}", label, e);
                break;
            }
        }
    }
}
