use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub hls: HlsConfig,
    pub transcoder: TranscoderConfig,
    pub push: PushConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HlsConfig {
    /// Directory holding one sub-directory per live venue
    pub root: PathBuf,
    /// URL path the root is served under
    pub mount: String,
    /// Externally reachable base URL, used to build playback links in pushes
    pub public_base_url: String,
}

impl HlsConfig {
    pub fn playback_url(&self, venue_id: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            self.mount.trim_end_matches('/'),
            venue_id,
            crate::segments::MANIFEST_NAME
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    pub program: String,
    pub sample_rate: u32,
    pub bitrate: String,
    pub segment_secs: u32,
    pub list_size: u32,
    pub write_timeout_ms: u64,
    pub stop_grace_ms: u64,
}

impl TranscoderConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            sample_rate: 16000,
            bitrate: "128k".to_string(),
            segment_secs: 1,
            list_size: 3,
            write_timeout_ms: 5000,
            stop_grace_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// When false, notifications are only logged
    pub enabled: bool,
    pub project_id: Option<String>,
    pub service_account_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// JSON snapshot of registered tokens; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an optional file plus `AZAAN__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let transcoder = TranscoderConfig::default();

        let settings = config::Config::builder()
            .set_default("service.name", "azaan-relay")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 3000_i64)?
            .set_default("hls.root", "hls")?
            .set_default("hls.mount", "/hls")?
            .set_default("hls.public_base_url", "http://localhost:3000")?
            .set_default("transcoder.program", transcoder.program)?
            .set_default("transcoder.sample_rate", i64::from(transcoder.sample_rate))?
            .set_default("transcoder.bitrate", transcoder.bitrate)?
            .set_default("transcoder.segment_secs", i64::from(transcoder.segment_secs))?
            .set_default("transcoder.list_size", i64::from(transcoder.list_size))?
            .set_default("transcoder.write_timeout_ms", transcoder.write_timeout_ms as i64)?
            .set_default("transcoder.stop_grace_ms", transcoder.stop_grace_ms as i64)?
            .set_default("push.enabled", false)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AZAAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
