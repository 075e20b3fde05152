//! Effective configuration with provenance
//!
//! Captures the merged configuration plus where each layer came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::views::{HandshakeConfig, QrConfig};

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "coldwire/effective_config@1";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

const MAX_FALLBACK_GRACE_MS: u64 = 60_000;
const MAX_QR_INTERVAL_MS: u64 = 10_000;
const MAX_QR_FRAMES: u64 = 64;

impl EffectiveConfig {
    /// Build effective config: built-in defaults, then the TOML file at
    /// `config_path` if it exists, then CLI overrides.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut config = BuiltinDefaults::default().to_value();
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        match config_path {
            Some(path) if path.exists() => {
                let (value, digest) = Self::load_toml_file(path)?;
                overlay(&mut config, value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
            Some(path) => tracing::debug!(path = %path.display(), "config file not found, skipping"),
            None => {}
        }

        if let Some(cli) = cli_overrides {
            overlay(&mut config, cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        Self::validate_config(&config)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => Value::Array(arr.into_iter().map(Self::toml_to_json).collect()),
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        let grace = Self::require_u64(config, "handshake.fallback_grace_ms")?;
        if grace > MAX_FALLBACK_GRACE_MS {
            return Err(ConfigError::ValidationError(format!(
                "handshake.fallback_grace_ms must be in [0, {}]",
                MAX_FALLBACK_GRACE_MS
            )));
        }

        for key in ["qr.cycle_interval_ms", "qr.poll_interval_ms"] {
            let interval = Self::require_u64(config, key)?;
            if interval == 0 || interval > MAX_QR_INTERVAL_MS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, {}]",
                    key, MAX_QR_INTERVAL_MS
                )));
            }
        }

        let frames = Self::require_u64(config, "qr.max_frames")?;
        if frames == 0 || frames > MAX_QR_FRAMES {
            return Err(ConfigError::ValidationError(format!(
                "qr.max_frames must be in (0, {}]",
                MAX_QR_FRAMES
            )));
        }

        match lookup(config, "signaling.url").and_then(|v| v.as_str()) {
            Some(url) if !url.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::ValidationError(
                "signaling.url must be a non-empty string".to_string(),
            )),
        }
    }

    fn require_u64(config: &Value, key: &str) -> Result<u64, ConfigError> {
        lookup(config, key).and_then(|v| v.as_u64()).ok_or_else(|| {
            ConfigError::ValidationError(format!("{} must be a non-negative integer", key))
        })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.config, path)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Handshake settings.
    pub fn handshake(&self) -> HandshakeConfig {
        let defaults = HandshakeConfig::default();
        HandshakeConfig {
            fallback_grace: self
                .get_u64("handshake.fallback_grace_ms")
                .map(std::time::Duration::from_millis)
                .or(defaults.fallback_grace),
        }
    }

    /// Visual channel settings.
    pub fn qr(&self) -> QrConfig {
        let defaults = QrConfig::default();
        QrConfig {
            cycle_interval: self
                .get_u64("qr.cycle_interval_ms")
                .map(std::time::Duration::from_millis)
                .unwrap_or(defaults.cycle_interval),
            poll_interval: self
                .get_u64("qr.poll_interval_ms")
                .map(std::time::Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_frames: self
                .get_u64("qr.max_frames")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_frames),
        }
    }

    /// Signaling relay endpoint.
    pub fn signaling_url(&self) -> Option<&str> {
        self.get_str("signaling.url")
    }
}

/// Lay `layer` over `target`. Tables merge key by key; any other value,
/// arrays included, replaces what was there.
fn overlay(target: &mut Value, layer: Value) {
    match layer {
        Value::Object(table) if target.is_object() => {
            if let Value::Object(base) = target {
                for (key, value) in table {
                    match base.get_mut(&key) {
                        Some(slot) => overlay(slot, value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
        }
        other => *target = other,
    }
}

fn lookup<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = config;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
