use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the broadcast relay
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid venue id: {0:?}")]
    InvalidVenue(String),

    #[error("Venue {0} already has a live broadcast")]
    VenueBusy(String),

    #[error("Failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Transcoder input is closed")]
    BrokenPipe,

    #[error("Transcoder write timed out after {0}ms")]
    WriteTimeout(u64),

    #[error("Push delivery failed: {0}")]
    NotificationDelivery(String),

    #[error("Failed to clean up segment directory {path:?}: {source}")]
    DirectoryCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare segment directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
