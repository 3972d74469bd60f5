//! Configuration system for Facestream.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FACESTREAM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/facestream/config.toml
//!   3. ~/.config/facestream/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{self, WireError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FacestreamConfig {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket/HTTP listener binds to.
    pub bind_addr: String,
    pub port: u16,
    /// Serve the JSON status API alongside the stream endpoint.
    pub api_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per outbound chunk.
    pub chunk_size: usize,
    /// Transport limit on a single message, header included.
    pub max_message_size: usize,
    /// Evict partial frames idle for longer than this. 0 = never.
    pub pending_frame_ttl_secs: u64,
    /// How often the eviction loop runs.
    pub eviction_interval_secs: u64,
    /// Outbound messages buffered per connection before senders wait.
    pub outbox_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smallest face, in pixels, the scale pyramid searches for.
    pub min_face_size: u32,
    /// Ratio between consecutive pyramid scales.
    pub scale_factor: f64,
    /// Score thresholds for the proposal, refinement and output stages.
    pub thresholds: [f32; 3],
    /// Directory holding pnet.onnx, rnet.onnx and onet.onnx.
    pub model_dir: PathBuf,
    /// Frames run through the cascade concurrently. 0 = available parallelism.
    pub max_concurrent_frames: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            api_enabled: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: wire::DEFAULT_CHUNK_SIZE,
            max_message_size: wire::DEFAULT_MAX_MESSAGE_SIZE,
            pending_frame_ttl_secs: 0,
            eviction_interval_secs: 5,
            outbox_capacity: 64,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            scale_factor: 0.709,
            thresholds: [0.6, 0.7, 0.7],
            model_dir: data_dir().join("models"),
            max_concurrent_frames: 0,
        }
    }
}

impl DetectionConfig {
    /// Resolved worker count for the cascade pool.
    pub fn worker_count(&self) -> usize {
        if self.max_concurrent_frames == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_concurrent_frames
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("facestream")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("facestream")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid transfer settings: {0}")]
    Transfer(#[from] WireError),
    #[error("invalid detection settings: {0}")]
    Detection(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FacestreamConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            FacestreamConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FACESTREAM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&FacestreamConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings the protocol or the cascade cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        wire::check_chunk_size(self.transfer.chunk_size, self.transfer.max_message_size)?;

        let d = &self.detection;
        if d.min_face_size == 0 {
            return Err(ConfigError::Detection("min_face_size must be positive".into()));
        }
        if !(d.scale_factor > 0.0 && d.scale_factor < 1.0) {
            return Err(ConfigError::Detection(format!(
                "scale_factor {} must lie in (0, 1)",
                d.scale_factor
            )));
        }
        if let Some(t) = d.thresholds.iter().find(|t| !(**t > 0.0 && **t <= 1.0)) {
            return Err(ConfigError::Detection(format!(
                "threshold {t} must lie in (0, 1]"
            )));
        }
        Ok(())
    }

    /// Apply FACESTREAM_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACESTREAM_SERVER__BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(p) = lookup("FACESTREAM_SERVER__PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = lookup("FACESTREAM_SERVER__API_ENABLED") {
            self.server.api_enabled = v == "true" || v == "1";
        }
        if let Some(n) = lookup("FACESTREAM_TRANSFER__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.transfer.chunk_size = n;
        }
        if let Some(n) =
            lookup("FACESTREAM_TRANSFER__PENDING_FRAME_TTL_SECS").and_then(|v| v.parse().ok())
        {
            self.transfer.pending_frame_ttl_secs = n;
        }
        if let Some(v) = lookup("FACESTREAM_DETECTION__MODEL_DIR") {
            self.detection.model_dir = PathBuf::from(v);
        }
        if let Some(n) =
            lookup("FACESTREAM_DETECTION__MAX_CONCURRENT_FRAMES").and_then(|v| v.parse().ok())
        {
            self.detection.max_concurrent_frames = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = FacestreamConfig::default();
        assert_eq!(config.transfer.chunk_size, 1024);
        assert_eq!(config.transfer.pending_frame_ttl_secs, 0);
        assert_eq!(config.detection.min_face_size, 20);
        assert_eq!(config.detection.thresholds, [0.6, 0.7, 0.7]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FacestreamConfig::from_toml(
            r#"
            [server]
            port = 9100

            [transfer]
            chunk_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.transfer.chunk_size, 4096);
        assert_eq!(config.transfer.max_message_size, wire::DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.detection.scale_factor, 0.709);
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("FACESTREAM_SERVER__PORT", "9200"),
            ("FACESTREAM_TRANSFER__CHUNK_SIZE", "2048"),
            ("FACESTREAM_TRANSFER__PENDING_FRAME_TTL_SECS", "30"),
            ("FACESTREAM_SERVER__API_ENABLED", "false"),
            ("FACESTREAM_DETECTION__MAX_CONCURRENT_FRAMES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = FacestreamConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.transfer.chunk_size, 2048);
        assert_eq!(config.transfer.pending_frame_ttl_secs, 30);
        assert!(!config.server.api_enabled);
        // Unparseable values leave the previous setting alone.
        assert_eq!(config.detection.max_concurrent_frames, 0);
    }

    #[test]
    fn validate_rejects_oversized_chunks() {
        let mut config = FacestreamConfig::default();
        config.transfer.chunk_size = config.transfer.max_message_size;
        assert!(matches!(config.validate(), Err(ConfigError::Transfer(_))));

        config.transfer.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Transfer(WireError::ZeroChunkSize))
        ));
    }

    #[test]
    fn validate_rejects_bad_detection_settings() {
        let mut config = FacestreamConfig::default();
        config.detection.scale_factor = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Detection(_))));

        let mut config = FacestreamConfig::default();
        config.detection.thresholds = [0.6, 0.0, 0.7];
        assert!(matches!(config.validate(), Err(ConfigError::Detection(_))));

        let mut config = FacestreamConfig::default();
        config.detection.min_face_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Detection(_))));
    }

    #[test]
    fn worker_count_resolves_zero() {
        let mut d = DetectionConfig::default();
        assert!(d.worker_count() >= 1);
        d.max_concurrent_frames = 3;
        assert_eq!(d.worker_count(), 3);
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("facestream-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("FACESTREAM_CONFIG", config_path.to_str().unwrap());
        }

        let path = FacestreamConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let text = std::fs::read_to_string(&path).unwrap();
        let config = FacestreamConfig::from_toml(&text).expect("default config should parse");
        assert_eq!(config.transfer.chunk_size, 1024);

        unsafe {
            std::env::remove_var("FACESTREAM_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
