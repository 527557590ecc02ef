use crate::error::{RelayError, Result};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Byte sink feeding the transcoder (its stdin for a real process)
pub type ProcessInput = Box<dyn AsyncWrite + Send + Unpin>;

/// How a transcoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when terminated by a signal or unknown
    pub code: Option<i32>,
    /// Whether the supervisor had to kill the process after the grace period
    pub forced: bool,
}

impl ExitReport {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            forced: false,
        }
    }

    /// Supervisor went away without reporting
    pub fn unknown() -> Self {
        Self {
            code: None,
            forced: false,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.forced
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.forced) {
            (_, true) => f.write_str("killed after grace period"),
            (Some(code), false) => write!(f, "exit code {}", code),
            (None, false) => f.write_str("terminated by signal"),
        }
    }
}

/// Sender half used by transcoder implementations to publish the exit
pub type ExitPublisher = watch::Sender<Option<ExitReport>>;

/// Create the channel pair linking a process monitor to its handle
pub fn exit_channel() -> (ExitPublisher, ExitSignal) {
    let (tx, rx) = watch::channel(None);
    (tx, ExitSignal(rx))
}

/// Resolves once the process has exited
#[derive(Debug, Clone)]
pub struct ExitSignal(watch::Receiver<Option<ExitReport>>);

impl ExitSignal {
    pub fn current(&self) -> Option<ExitReport> {
        *self.0.borrow()
    }

    pub async fn wait(&mut self) -> ExitReport {
        loop {
            let current = *self.0.borrow_and_update();
            if let Some(report) = current {
                return report;
            }
            if self.0.changed().await.is_err() {
                let last = *self.0.borrow();
                return last.unwrap_or_else(ExitReport::unknown);
            }
        }
    }
}

/// Exclusive handle to one running transcoder
///
/// Writes go straight to the process input. Stopping closes the input and
/// asks the monitor task to terminate the process, waiting a bounded time for
/// it to confirm.
pub struct ProcessHandle {
    label: String,
    input: Option<ProcessInput>,
    exit: ExitSignal,
    stop_tx: Option<oneshot::Sender<()>>,
    write_timeout: Duration,
    stop_timeout: Duration,
}

impl ProcessHandle {
    pub fn new(
        label: impl Into<String>,
        input: ProcessInput,
        exit: ExitSignal,
        stop_tx: oneshot::Sender<()>,
        write_timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            input: Some(input),
            exit,
            stop_tx: Some(stop_tx),
            write_timeout,
            stop_timeout,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Signal that resolves when the process exits, for use in `select!`
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.current().is_some()
    }

    /// Write raw bytes to the process input.
    ///
    /// Any failure closes the input for good; later writes return `BrokenPipe`.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let input = self.input.as_mut().ok_or(RelayError::BrokenPipe)?;

        match timeout(self.write_timeout, input.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!("{}: input write failed: {}", self.label, e);
                self.input = None;
                Err(RelayError::BrokenPipe)
            }
            Err(_) => {
                self.input = None;
                Err(RelayError::WriteTimeout(self.write_timeout.as_millis() as u64))
            }
        }
    }

    /// Close the input and terminate the process. Safe to call repeatedly.
    ///
    /// Returns `None` if the process did not confirm termination in time.
    pub async fn stop(&mut self) -> Option<ExitReport> {
        if let Some(mut input) = self.input.take() {
            match timeout(self.write_timeout, input.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("{}: closing input failed: {}", self.label, e),
                Err(_) => debug!("{}: closing input timed out", self.label),
            }
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the monitor already finished
            let _ = stop_tx.send(());
        }

        let mut exit = self.exit.clone();
        match timeout(self.stop_timeout, exit.wait()).await {
            Ok(report) => Some(report),
            Err(_) => {
                warn!(
                    "{}: no exit confirmation after {:?}",
                    self.label, self.stop_timeout
                );
                None
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("input_open", &self.input.is_some())
            .field("exit", &self.exit.current())
            .finish()
    }
}
