use crate::config::TranscoderConfig;
use crate::segments::{MANIFEST_NAME, SEGMENT_PATTERN};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// ffmpeg invocation turning raw mono s16le PCM on stdin into a live HLS playlist
#[derive(Debug, Clone)]
pub struct HlsArgs {
    pub sample_rate: u32,
    pub bitrate: String,
    pub segment_secs: u32,
    pub list_size: u32,
    pub output_dir: PathBuf,
}

impl HlsArgs {
    pub fn new(config: &TranscoderConfig, output_dir: &Path) -> Self {
        Self {
            sample_rate: config.sample_rate,
            bitrate: config.bitrate.clone(),
            segment_secs: config.segment_secs.max(1),
            list_size: config.list_size.max(1),
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_NAME)
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "warning",
            // Input: raw PCM, mono, 16-bit little-endian
            "-f",
            "s16le",
            "-ar",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push(self.sample_rate.to_string().into());
        for arg in ["-ac", "1", "-i", "pipe:0", "-c:a", "aac", "-b:a"] {
            args.push(arg.into());
        }
        args.push(self.bitrate.clone().into());

        // Output: rolling live playlist, old segments deleted, no ENDLIST tag
        for arg in ["-f", "hls", "-hls_time"] {
            args.push(arg.into());
        }
        args.push(self.segment_secs.to_string().into());
        args.push("-hls_list_size".into());
        args.push(self.list_size.to_string().into());
        args.push("-hls_flags".into());
        args.push("delete_segments+omit_endlist".into());
        args.push("-hls_segment_filename".into());
        args.push(self.output_dir.join(SEGMENT_PATTERN).into_os_string());
        args.push(self.manifest_path().into_os_string());

        args
    }
}
