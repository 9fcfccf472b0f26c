//! Telemetry configuration
//!
//! Loaded from a camelCase JSON file; every field has a default, so an empty
//! object is a valid configuration.

use crate::clips::ffmpeg::FfmpegCutter;
use crate::recorder::manager::CaptureLayout;
use crate::storage::store::{JsonFileStore, StoreError};
use crate::sync::rate_limit::RateLimitConfig;
use crate::utils::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

// =============================================================================
// Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    /// Rotating buffer slots
    pub buffers_dir: PathBuf,
    pub buffer_count: usize,

    /// Root of per-session output directories
    pub cache_dir: PathBuf,
    pub session_length_secs: u64,

    /// Disk ceiling over `quota_roots` (the cache dir when empty)
    pub quota_bytes: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quota_roots: Vec<PathBuf>,

    pub upload_window_secs: u64,
    pub upload_window_max_bytes: u64,

    /// Durable rate limiter counters
    pub counter_store_path: PathBuf,
    pub counter_prefix: String,

    pub ffmpeg_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            buffers_dir: PathBuf::from("Buffers"),
            buffer_count: 3,
            cache_dir: PathBuf::from("Cache"),
            session_length_secs: 5 * 60,
            quota_bytes: 300 * MIB,
            quota_roots: Vec::new(),
            upload_window_secs: 60 * 60,
            upload_window_max_bytes: 30 * MIB,
            counter_store_path: PathBuf::from("counters.json"),
            counter_prefix: "telemetry".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl TelemetryConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> TelemetryResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: TelemetryConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded telemetry config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.buffer_count == 0 {
            return Err(TelemetryError::Config("bufferCount must be at least 1".to_string()));
        }
        if self.session_length_secs == 0 {
            return Err(TelemetryError::Config(
                "sessionLengthSecs must be positive".to_string(),
            ));
        }
        if self.upload_window_secs == 0 {
            return Err(TelemetryError::Config(
                "uploadWindowSecs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_length(&self) -> Duration {
        Duration::from_secs(self.session_length_secs)
    }

    pub fn effective_quota_roots(&self) -> Vec<PathBuf> {
        if self.quota_roots.is_empty() {
            vec![self.cache_dir.clone()]
        } else {
            self.quota_roots.clone()
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.upload_window_secs),
            max_bytes: self.upload_window_max_bytes,
            key_prefix: self.counter_prefix.clone(),
        }
    }

    pub fn ffmpeg_cutter(&self) -> FfmpegCutter {
        FfmpegCutter::new(&self.ffmpeg_path)
    }

    /// Open the durable counter file backing the rate limiter
    pub fn open_store(&self) -> Result<JsonFileStore, StoreError> {
        JsonFileStore::open(&self.counter_store_path)
    }

    pub fn capture_layout(&self) -> CaptureLayout {
        CaptureLayout {
            buffers_dir: self.buffers_dir.clone(),
            buffer_count: self.buffer_count,
            cache_dir: self.cache_dir.clone(),
            session_length: self.session_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config: TelemetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.quota_bytes, 300 * 1024 * 1024);
        assert_eq!(config.effective_quota_roots(), vec![PathBuf::from("Cache")]);
        assert_eq!(config.rate_limit().window, Duration::from_secs(3600));
        assert_eq!(config.rate_limit().max_bytes, 30 * 1024 * 1024);
    }

    #[test]
    fn test_load_camel_case_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.json");
        fs::write(
            &path,
            r#"{
                "cacheDir": "/data/cache",
                "sessionLengthSecs": 60,
                "quotaRoots": ["/data/cache", "/data/recordings"],
                "counterPrefix": "video"
            }"#,
        )
        .unwrap();

        let config = TelemetryConfig::load(&path).unwrap();
        assert_eq!(config.session_length(), Duration::from_secs(60));
        assert_eq!(config.effective_quota_roots().len(), 2);
        assert_eq!(config.rate_limit().key_prefix, "video");
        assert_eq!(config.capture_layout().cache_dir, PathBuf::from("/data/cache"));
        assert_eq!(config.buffer_count, 3);
    }

    #[test]
    fn test_store_and_cutter_follow_config() {
        let dir = tempdir().unwrap();
        let config = TelemetryConfig {
            counter_store_path: dir.path().join("state").join("counters.json"),
            ffmpeg_path: PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
            ..Default::default()
        };

        let store = config.open_store().unwrap();
        assert_eq!(store.path(), config.counter_store_path.as_path());

        let cutter = config.ffmpeg_cutter();
        assert_eq!(cutter.ffmpeg_path(), Path::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        for json in [
            r#"{"bufferCount": 0}"#,
            r#"{"sessionLengthSecs": 0}"#,
            r#"{"uploadWindowSecs": 0}"#,
        ] {
            let config: TelemetryConfig = serde_json::from_str(json).unwrap();
            assert!(matches!(config.validate(), Err(TelemetryError::Config(_))));
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = TelemetryConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(TelemetryError::Io(_))));
    }
}
