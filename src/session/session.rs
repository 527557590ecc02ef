use super::registry::{SessionClaim, SessionShared};
use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::{RelayError, Result};
use crate::segments::SegmentStore;
use crate::transcoder::{ExitReport, ExitSignal, ProcessHandle};
use crate::venue::VenueId;
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a session waits in the background for an unconfirmed transcoder exit
const ORPHAN_EXIT_WAIT: Duration = Duration::from_secs(10);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Broadcaster closed the socket or the transport failed
    Disconnected,
    TranscoderExited(ExitReport),
    WriteFailed,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Disconnected => f.write_str("broadcaster disconnected"),
            CloseReason::TranscoderExited(report) => write!(f, "transcoder exited, {}", report),
            CloseReason::WriteFailed => f.write_str("transcoder input failed"),
            CloseReason::Shutdown => f.write_str("server shutting down"),
        }
    }
}

/// One live broadcast: a venue, its transcoder and its segment directory
///
/// Owned by the connection task, which is the only writer to the transcoder.
/// Teardown runs at most once no matter which event triggers it first.
pub struct BroadcastSession {
    shared: Arc<SessionShared>,
    claim: Option<SessionClaim>,
    process: ProcessHandle,
    segment_dir: PathBuf,
    store: SegmentStore,
    shutdown: watch::Receiver<bool>,
    close_reason: Option<CloseReason>,
}

impl fmt::Debug for BroadcastSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastSession")
            .field("shared", &self.shared)
            .field("claim", &self.claim)
            .field("segment_dir", &self.segment_dir)
            .field("store", &self.store)
            .field("close_reason", &self.close_reason)
            .finish_non_exhaustive()
    }
}

impl BroadcastSession {
    pub(crate) fn new(
        claim: SessionClaim,
        process: ProcessHandle,
        segment_dir: PathBuf,
        store: SegmentStore,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            shared: Arc::clone(claim.shared()),
            claim: Some(claim),
            process,
            segment_dir,
            store,
            shutdown,
            close_reason: None,
        }
    }

    pub fn venue(&self) -> &VenueId {
        self.shared.venue()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn segment_dir(&self) -> &Path {
        &self.segment_dir
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    /// Forward one audio frame to the transcoder, untouched.
    ///
    /// On failure the frame is dropped and the session is marked for closure.
    pub async fn on_audio_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.state() != SessionState::Active || self.close_reason.is_some() {
            return Err(RelayError::BrokenPipe);
        }

        match self.process.write(frame).await {
            Ok(()) => {
                self.shared.record_frame(frame.len());
                Ok(())
            }
            Err(e) => {
                warn!(venue = %self.venue(), session = %self.session_id(), "Dropping frame: {}", e);
                self.close_reason.get_or_insert(CloseReason::WriteFailed);
                Err(e)
            }
        }
    }

    /// Relay frames until the stream ends, the transcoder exits, a write
    /// fails or the server shuts down, then tear the session down.
    pub async fn relay<S, F>(mut self, frames: S) -> SessionStats
    where
        S: Stream<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut frames = std::pin::pin!(frames);
        let mut exit = self.process.exit_signal();
        let mut shutdown = self.shutdown.clone();

        info!(venue = %self.venue(), session = %self.session_id(), "Relaying audio to {}", self.process.label());

        let reason = loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(frame) => {
                        if self.on_audio_frame(frame.as_ref()).await.is_err() {
                            break CloseReason::WriteFailed;
                        }
                    }
                    None => break CloseReason::Disconnected,
                },
                report = exit.wait() => break CloseReason::TranscoderExited(report),
                _ = shutdown_requested(&mut shutdown) => break CloseReason::Shutdown,
            }
        };

        self.close_reason.get_or_insert(reason);
        self.disconnect().await
    }

    /// Stop the transcoder, then purge the segment directory. Idempotent.
    pub async fn disconnect(&mut self) -> SessionStats {
        if !self.shared.transition(SessionState::Closing) {
            return self.stats();
        }

        let reason = *self.close_reason.get_or_insert(CloseReason::Disconnected);
        info!(venue = %self.venue(), session = %self.session_id(), "Closing broadcast: {}", reason);

        match self.process.stop().await {
            Some(report) => {
                // Output may only be deleted once the process stopped writing it
                if let Err(e) = self.store.purge(&self.segment_dir).await {
                    error!(venue = %self.venue(), "{}", e);
                }
                if !report.success() && !matches!(reason, CloseReason::TranscoderExited(_)) {
                    warn!(venue = %self.venue(), "{} ended with {}", self.process.label(), report);
                }
            }
            None => {
                // Keep the venue until the process is gone so no new session
                // prepares a directory it may still be writing
                error!(
                    venue = %self.venue(),
                    "{} did not confirm exit, holding the venue until it does",
                    self.process.label()
                );
                tokio::spawn(release_after_exit(
                    self.process.exit_signal(),
                    self.store.clone(),
                    self.segment_dir.clone(),
                    Arc::clone(&self.shared),
                    self.claim.take(),
                ));
            }
        }

        self.shared.transition(SessionState::Closed);
        self.claim.take();

        let stats = self.stats();
        info!(
            venue = %self.venue(),
            session = %self.session_id(),
            "Broadcast closed after {:.1}s ({} frames, {} bytes)",
            stats.duration_secs,
            stats.frames_relayed,
            stats.bytes_relayed
        );
        stats
    }
}

impl Drop for BroadcastSession {
    fn drop(&mut self) {
        if self.state() == SessionState::Closed {
            return;
        }

        // Dropped mid-session (upgrade never completed, task cancelled).
        // Dropping the handle makes the supervisor terminate the process;
        // purge afterwards and only then give the venue back.
        warn!(venue = %self.venue(), "Session dropped without disconnect, cleaning up in background");
        self.shared.transition(SessionState::Closing);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(release_after_exit(
            self.process.exit_signal(),
            self.store.clone(),
            self.segment_dir.clone(),
            Arc::clone(&self.shared),
            self.claim.take(),
        ));
    }
}

/// Purge once the process is confirmed gone, then give the venue back.
///
/// The venue is released after `ORPHAN_EXIT_WAIT` even without confirmation;
/// the next `prepare` clears whatever is left.
async fn release_after_exit(
    mut exit: ExitSignal,
    store: SegmentStore,
    dir: PathBuf,
    shared: Arc<SessionShared>,
    claim: Option<SessionClaim>,
) {
    match tokio::time::timeout(ORPHAN_EXIT_WAIT, exit.wait()).await {
        Ok(report) => {
            debug!(venue = %shared.venue(), "Transcoder exited ({})", report);
            if let Err(e) = store.purge(&dir).await {
                error!(venue = %shared.venue(), "{}", e);
            }
        }
        Err(_) => warn!(
            venue = %shared.venue(),
            "Transcoder exit never confirmed, releasing venue after {:?}",
            ORPHAN_EXIT_WAIT
        ),
    }
    shared.transition(SessionState::Closed);
    drop(claim);
}

/// Resolves once shutdown is signalled; never if the manager is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
