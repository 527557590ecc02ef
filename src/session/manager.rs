use super::registry::SessionRegistry;
use super::session::BroadcastSession;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::config::HlsConfig;
use crate::directory::ListenerDirectory;
use crate::error::Result;
use crate::notify::NotificationFanout;
use crate::segments::SegmentStore;
use crate::transcoder::Transcoder;
use crate::venue::VenueId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Accepts broadcasters and wires each one to a transcoder, a segment
/// directory and a listener notification
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    store: SegmentStore,
    transcoder: Arc<dyn Transcoder>,
    directory: Arc<ListenerDirectory>,
    fanout: NotificationFanout,
    hls: HlsConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(
        store: SegmentStore,
        transcoder: Arc<dyn Transcoder>,
        directory: Arc<ListenerDirectory>,
        fanout: NotificationFanout,
        hls: HlsConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: Arc::new(SessionRegistry::new()),
            store,
            transcoder,
            directory,
            fanout,
            hls,
            shutdown_tx,
        }
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn hls(&self) -> &HlsConfig {
        &self.hls
    }

    pub fn directory(&self) -> &Arc<ListenerDirectory> {
        &self.directory
    }

    /// Start a session for a connecting broadcaster.
    ///
    /// Fails without side effects on an invalid venue or a venue that is
    /// already live. A transcoder that fails to start leaves nothing behind.
    pub async fn accept(&self, raw_venue: Option<&str>) -> Result<BroadcastSession> {
        let venue = match VenueId::from_optional(raw_venue) {
            Ok(venue) => venue,
            Err(e) => {
                warn!("Rejecting broadcaster with invalid venue id {:?}", raw_venue);
                return Err(e);
            }
        };

        let claim = self.registry.claim(&venue)?;
        let shared = Arc::clone(claim.shared());

        info!(venue = %venue, session = %shared.session_id(), "Broadcaster connected");

        let segment_dir = match self.store.prepare(&venue).await {
            Ok(dir) => dir,
            Err(e) => {
                error!(venue = %venue, "{}", e);
                shared.transition(SessionState::Closing);
                shared.transition(SessionState::Closed);
                return Err(e);
            }
        };

        let process = match self.transcoder.start(&venue, &segment_dir).await {
            Ok(process) => process,
            Err(e) => {
                error!(venue = %venue, "Failed to start {}: {}", self.transcoder.name(), e);
                shared.transition(SessionState::Closing);
                if let Err(cleanup) = self.store.purge(&segment_dir).await {
                    error!(venue = %venue, "{}", cleanup);
                }
                shared.transition(SessionState::Closed);
                return Err(e);
            }
        };

        shared.transition(SessionState::Active);
        self.announce(venue.clone());

        Ok(BroadcastSession::new(
            claim,
            process,
            segment_dir,
            self.store.clone(),
            self.shutdown_tx.subscribe(),
        ))
    }

    /// Notify the venue's listeners in the background
    fn announce(&self, venue: VenueId) {
        let directory = Arc::clone(&self.directory);
        let fanout = self.fanout.clone();
        let playback_url = self.hls.playback_url(venue.as_str());

        tokio::spawn(async move {
            let tokens = directory.listeners(&venue).await;
            fanout.dispatch(&venue, &playback_url, tokens).await;
        });
    }

    pub fn session(&self, venue: &VenueId) -> Option<SessionStats> {
        self.registry.get(venue)
    }

    pub fn sessions(&self) -> Vec<SessionStats> {
        self.registry.snapshot()
    }

    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Ask every live session to close and wait for them to finish
    ///
    /// Returns false if some were still running when `limit` elapsed.
    pub async fn shutdown(&self, limit: Duration) -> bool {
        let live = self.registry.len();
        if live > 0 {
            info!("Closing {} live broadcast(s)", live);
        }

        self.shutdown_tx.send_replace(true);

        let drained = self.registry.wait_drained(limit).await;
        if !drained {
            warn!("{} broadcast(s) still open after {:?}", self.registry.len(), limit);
        }
        drained
    }
}
