//! Per-venue registry of device tokens
//!
//! Devices register as `listener` (receives the live push) or `broadcaster`.
//! A token holds at most one role per venue.

use crate::error::{RelayError, Result};
use crate::venue::VenueId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Listener,
    Broadcaster,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "listener" => Ok(Role::Listener),
            "broadcaster" => Ok(Role::Broadcaster),
            other => Err(format!("unknown role {:?}", other)),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct VenueTokens {
    listeners: BTreeSet<String>,
    broadcasters: BTreeSet<String>,
}

/// Token sets per venue, optionally snapshotted to a JSON file
pub struct ListenerDirectory {
    venues: RwLock<HashMap<VenueId, VenueTokens>>,
    snapshot_path: Option<PathBuf>,
}

impl ListenerDirectory {
    pub fn in_memory() -> Self {
        Self {
            venues: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Open a directory backed by `path`, loading it if it exists
    pub async fn open(path: PathBuf) -> Result<Self> {
        let venues = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<HashMap<VenueId, VenueTokens>>(&raw).map_err(
                |e| {
                    RelayError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("corrupt token snapshot {}: {}", path.display(), e),
                    ))
                },
            )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded token snapshot {} ({} venues)",
            path.display(),
            venues.len()
        );

        Ok(Self {
            venues: RwLock::new(venues),
            snapshot_path: Some(path),
        })
    }

    /// Register `token` under `role`, removing it from the other role's set.
    ///
    /// With a snapshot configured the change only takes effect once it is on disk.
    pub async fn register(&self, token: &str, role: Role, venue: &VenueId) -> Result<()> {
        let mut venues = self.venues.write().await;
        let mut entry = venues.get(venue).cloned().unwrap_or_default();

        match role {
            Role::Listener => {
                entry.broadcasters.remove(token);
                entry.listeners.insert(token.to_string());
            }
            Role::Broadcaster => {
                entry.listeners.remove(token);
                entry.broadcasters.insert(token.to_string());
            }
        }

        match &self.snapshot_path {
            Some(path) => {
                let mut next = venues.clone();
                next.insert(venue.clone(), entry);
                // Still under the write lock, so snapshots land in order
                persist(path, &next).await?;
                *venues = next;
            }
            None => {
                venues.insert(venue.clone(), entry);
            }
        }

        debug!(venue = %venue, "Registered {:?} token", role);
        Ok(())
    }

    /// Tokens currently subscribed to the venue's live notifications
    pub async fn listeners(&self, venue: &VenueId) -> Vec<String> {
        let venues = self.venues.read().await;
        venues
            .get(venue)
            .map(|v| v.listeners.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn broadcasters(&self, venue: &VenueId) -> Vec<String> {
        let venues = self.venues.read().await;
        venues
            .get(venue)
            .map(|v| v.broadcasters.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Write `venues` to a temporary file, then swap it in
async fn persist(path: &Path, venues: &HashMap<VenueId, VenueTokens>) -> Result<()> {
    let json = serde_json::to_vec_pretty(venues)
        .map_err(|e| RelayError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tmp = path.with_extension("tmp");
    if let Err(e) = tokio::fs::write(&tmp, json).await {
        warn!("Failed to write token snapshot {}: {}", tmp.display(), e);
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!("Failed to replace token snapshot {}: {}", path.display(), e);
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

impl Default for ListenerDirectory {
    fn default() -> Self {
        Self::in_memory()
    }
}
