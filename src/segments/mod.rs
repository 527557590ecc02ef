//! On-disk HLS output, one directory per live venue
//!
//! The transcoder owns the contents (manifest plus rolling segments); this
//! module only creates the directory before a session and removes it after.

mod store;

pub use store::SegmentStore;

/// Manifest file name written by the transcoder
pub const MANIFEST_NAME: &str = "stream.m3u8";

/// printf-style segment pattern handed to the transcoder
pub const SEGMENT_PATTERN: &str = "segment-%d.ts";
