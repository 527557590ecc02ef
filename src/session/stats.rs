use super::state::SessionState;
use crate::venue::VenueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Statistics about a broadcast session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Uuid,

    pub venue_id: VenueId,

    pub state: SessionState,

    /// When the broadcaster connected
    pub started_at: DateTime<Utc>,

    /// Time since the broadcaster connected, in seconds
    pub duration_secs: f64,

    /// Binary frames forwarded to the transcoder
    pub frames_relayed: u64,

    /// Bytes forwarded to the transcoder
    pub bytes_relayed: u64,
}
