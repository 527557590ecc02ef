use crate::error::{RelayError, Result};
use crate::venue::VenueId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Root directory holding per-venue segment directories
#[derive(Debug, Clone)]
pub struct SegmentStore {
    root: PathBuf,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn venue_dir(&self, venue: &VenueId) -> PathBuf {
        self.root.join(venue.as_str())
    }

    pub async fn exists(&self, venue: &VenueId) -> bool {
        fs::try_exists(self.venue_dir(venue)).await.unwrap_or(false)
    }

    /// Create the root directory at startup
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| RelayError::Directory {
                path: self.root.clone(),
                source,
            })?;
        info!("Segment store ready at {}", self.root.display());
        Ok(())
    }

    /// Ensure an empty directory exists for the venue.
    ///
    /// Leftovers from a session that crashed before cleanup are purged first.
    pub async fn prepare(&self, venue: &VenueId) -> Result<PathBuf> {
        let dir = self.venue_dir(venue);

        if fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(venue = %venue, "Stale segment directory found, purging");
            self.purge(&dir).await?;
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|source| RelayError::Directory {
                path: dir.clone(),
                source,
            })?;

        debug!(venue = %venue, "Prepared segment directory {}", dir.display());
        Ok(dir)
    }

    /// Delete the files directly inside `dir`, then the directory itself.
    ///
    /// A missing directory is not an error. Sub-directories are left alone,
    /// which makes the final removal fail and is reported as a cleanup error.
    pub async fn purge(&self, dir: &Path) -> Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(cleanup_error(dir, source)),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| cleanup_error(dir, source))?
        {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            if file_type.is_dir() {
                warn!("Unexpected sub-directory {} left in place", path.display());
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                // The transcoder may have rotated the segment out already
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        match fs::remove_dir(dir).await {
            Ok(()) => {
                debug!("Purged {} ({} files)", dir.display(), removed);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(cleanup_error(dir, source)),
        }
    }
}

fn cleanup_error(dir: &Path, source: std::io::Error) -> RelayError {
    RelayError::DirectoryCleanup {
        path: dir.to_path_buf(),
        source,
    }
}
