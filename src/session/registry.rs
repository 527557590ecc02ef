use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::{RelayError, Result};
use crate::venue::VenueId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session data visible outside the task that owns the session
#[derive(Debug)]
pub struct SessionShared {
    session_id: Uuid,
    venue: VenueId,
    started_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    frames_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
}

impl SessionShared {
    fn new(venue: VenueId) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            venue,
            started_at: Utc::now(),
            state: Mutex::new(SessionState::Starting),
            frames_relayed: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Move to `next` if the edge is allowed; returns whether it happened
    pub fn transition(&self, next: SessionState) -> bool {
        let mut state = lock(&self.state);
        if state.can_transition_to(next) {
            debug!(venue = %self.venue, session = %self.session_id, "{} -> {}", *state, next);
            *state = next;
            true
        } else {
            debug!(venue = %self.venue, session = %self.session_id, "Refused {} -> {}", *state, next);
            false
        }
    }

    pub fn record_frame(&self, len: usize) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            session_id: self.session_id,
            venue_id: self.venue.clone(),
            state: self.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Live sessions by venue
///
/// Claiming a venue is a single check-and-insert under one lock, so two
/// concurrent connections for the same venue can never both get through.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    live: Mutex<HashMap<VenueId, Arc<SessionShared>>>,
    drained: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `venue` for a new session, failing if one is already live
    pub fn claim(self: &Arc<Self>, venue: &VenueId) -> Result<SessionClaim> {
        let mut live = lock(&self.live);

        if let Some(existing) = live.get(venue) {
            warn!(
                venue = %venue,
                session = %existing.session_id(),
                "Rejecting broadcaster, venue is {}",
                existing.state()
            );
            return Err(RelayError::VenueBusy(venue.to_string()));
        }

        let shared = Arc::new(SessionShared::new(venue.clone()));
        live.insert(venue.clone(), Arc::clone(&shared));

        Ok(SessionClaim {
            registry: Arc::clone(self),
            shared,
        })
    }

    fn release(&self, shared: &SessionShared) {
        let mut live = lock(&self.live);
        let owned = live
            .get(shared.venue())
            .is_some_and(|current| current.session_id() == shared.session_id());
        if owned {
            live.remove(shared.venue());
        }
        if live.is_empty() {
            self.drained.notify_waiters();
        }
    }

    pub fn get(&self, venue: &VenueId) -> Option<SessionStats> {
        lock(&self.live).get(venue).map(|s| s.stats())
    }

    pub fn snapshot(&self) -> Vec<SessionStats> {
        let mut stats: Vec<SessionStats> = lock(&self.live).values().map(|s| s.stats()).collect();
        stats.sort_by(|a, b| a.venue_id.cmp(&b.venue_id));
        stats
    }

    pub fn len(&self) -> usize {
        lock(&self.live).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every claim is released; false on timeout
    pub async fn wait_drained(&self, limit: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.drained.notified();
                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, drained).await.is_ok()
    }
}

/// Exclusive hold on a venue; released on drop
#[derive(Debug)]
pub struct SessionClaim {
    registry: Arc<SessionRegistry>,
    shared: Arc<SessionShared>,
}

impl SessionClaim {
    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.registry.release(&self.shared);
    }
}

/// The guarded data stays consistent even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
