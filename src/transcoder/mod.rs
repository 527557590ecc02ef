//! Supervision of the external transcoder process
//!
//! One process per live session reads raw PCM on its input and writes a
//! rolling HLS playlist into the session's segment directory.
//! - `Transcoder::start` spawns it
//! - `ProcessHandle::write` feeds it audio
//! - `ProcessHandle::stop` ends it, bounded by a grace period

mod args;
mod ffmpeg;
mod handle;

pub use args::HlsArgs;
pub use ffmpeg::FfmpegTranscoder;
pub use handle::{exit_channel, ExitPublisher, ExitReport, ExitSignal, ProcessHandle, ProcessInput};

use crate::error::Result;
use crate::venue::VenueId;
use std::path::Path;

/// Starts transcoder processes
///
/// Implementations:
/// - `FfmpegTranscoder`: real ffmpeg subprocess
/// - test doubles that record writes and simulate crashes
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Launch a process writing its HLS output into `output_dir`
    async fn start(&self, venue: &VenueId, output_dir: &Path) -> Result<ProcessHandle>;

    /// Name for logging
    fn name(&self) -> &str;
}
