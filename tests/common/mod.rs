// Shared test doubles for the session and HTTP tests
#![allow(dead_code)]

use azaan_relay::config::HlsConfig;
use azaan_relay::error::Result;
use azaan_relay::transcoder::{exit_channel, ExitPublisher};
use azaan_relay::{
    ExitReport, ListenerDirectory, NotificationFanout, NotificationMessage, ProcessHandle,
    PushSender, RelayError, SegmentStore, SessionManager, Transcoder, VenueId,
};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

pub const PUBLIC_BASE_URL: &str = "http://relay.test";

/// State shared by a fake transcoder and every process it started
#[derive(Default)]
pub struct FakeState {
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_spawn: AtomicBool,
    pub broken: AtomicBool,
    pub stalled: AtomicBool,
    pub hang_on_stop: AtomicBool,
    exit: Mutex<Option<Arc<ExitPublisher>>>,
}

/// Transcoder double: records every write, can fail to spawn, crash, break
/// its input, stall or ignore stop
#[derive(Clone, Default)]
pub struct FakeTranscoder {
    pub state: Arc<FakeState>,
}

impl FakeTranscoder {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.writes.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn fail_spawn(&self) {
        self.state.fail_spawn.store(true, Ordering::SeqCst);
    }

    pub fn break_pipe(&self) {
        self.state.broken.store(true, Ordering::SeqCst);
    }

    pub fn stall(&self) {
        self.state.stalled.store(true, Ordering::SeqCst);
    }

    /// Ignore stop requests until `crash` is called
    pub fn hang_on_stop(&self, hang: bool) {
        self.state.hang_on_stop.store(hang, Ordering::SeqCst);
    }

    /// Make the most recently started process exit on its own
    pub fn crash(&self, code: i32) {
        if let Some(exit) = self.state.exit.lock().unwrap().as_ref() {
            let _ = exit.send(Some(ExitReport::exited(code)));
        }
    }
}

#[async_trait::async_trait]
impl Transcoder for FakeTranscoder {
    async fn start(&self, _venue: &VenueId, output_dir: &Path) -> Result<ProcessHandle> {
        if self.state.fail_spawn.load(Ordering::SeqCst) {
            return Err(RelayError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "fake transcoder missing",
            )));
        }
        assert!(output_dir.is_dir(), "segment dir must exist before spawn");

        self.state.starts.fetch_add(1, Ordering::SeqCst);

        let (exit_tx, exit) = exit_channel();
        let exit_tx = Arc::new(exit_tx);
        *self.state.exit.lock().unwrap() = Some(Arc::clone(&exit_tx));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            // Resolves on stop or when the handle is dropped
            let _ = stop_rx.await;
            state.stops.fetch_add(1, Ordering::SeqCst);
            if state.hang_on_stop.load(Ordering::SeqCst) {
                return;
            }
            if exit_tx.borrow().is_none() {
                // ffmpeg reports 255 when interrupted
                let _ = exit_tx.send(Some(ExitReport::exited(255)));
            }
        });

        let writer = RecordingWriter {
            state: Arc::clone(&self.state),
        };

        Ok(ProcessHandle::new(
            "fake",
            Box::new(writer),
            exit,
            stop_tx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        ))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct RecordingWriter {
    state: Arc<FakeState>,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.state.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if self.state.stalled.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        self.state.writes.lock().unwrap().push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Push sender that records every attempt and fails for chosen tokens
#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<NotificationMessage>>,
    pub failing: Mutex<HashSet<String>>,
}

impl RecordingPush {
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_for(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }
}

#[async_trait::async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, message: &NotificationMessage) -> Result<String> {
        self.sent.lock().unwrap().push(message.clone());
        if self.failing.lock().unwrap().contains(&message.token) {
            return Err(RelayError::NotificationDelivery("unregistered".to_string()));
        }
        Ok(format!("projects/test/messages/{}", message.token))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A manager wired to fakes over a temporary segment root
pub struct Harness {
    pub tmp: TempDir,
    pub transcoder: FakeTranscoder,
    pub push: Arc<RecordingPush>,
    pub directory: Arc<ListenerDirectory>,
    pub manager: Arc<SessionManager>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let transcoder = FakeTranscoder::default();
        let push = Arc::new(RecordingPush::default());
        let directory = Arc::new(ListenerDirectory::in_memory());

        let hls = HlsConfig {
            root: tmp.path().to_path_buf(),
            mount: "/hls".to_string(),
            public_base_url: PUBLIC_BASE_URL.to_string(),
        };

        let manager = Arc::new(SessionManager::new(
            SegmentStore::new(tmp.path()),
            Arc::new(transcoder.clone()),
            Arc::clone(&directory),
            NotificationFanout::new(push.clone()),
            hls,
        ));

        Self {
            tmp,
            transcoder,
            push,
            directory,
            manager,
        }
    }

    pub fn venue_dir(&self, venue: &str) -> PathBuf {
        self.tmp.path().join(venue)
    }

    pub fn root_entries(&self) -> usize {
        std::fs::read_dir(self.tmp.path()).unwrap().count()
    }
}

pub fn venue(raw: &str) -> VenueId {
    VenueId::parse(raw).unwrap()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
