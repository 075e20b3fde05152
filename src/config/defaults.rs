//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Grace period between applying the answer and giving up on the peer
    /// channel, in milliseconds (default: 5000)
    pub fallback_grace_ms: u64,

    /// How long each QR frame stays on screen (default: 275)
    pub qr_cycle_interval_ms: u64,

    /// Camera sampling period (default: 200)
    pub qr_poll_interval_ms: u64,

    /// Frames kept in a displayed set (default: 4)
    pub qr_max_frames: u64,

    /// Signaling relay endpoint
    pub signaling_url: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            fallback_grace_ms: 5000,
            qr_cycle_interval_ms: 275,
            qr_poll_interval_ms: 200,
            qr_max_frames: 4,
            signaling_url: "wss://signal.coldwire.invalid".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "handshake": {
                "fallback_grace_ms": self.fallback_grace_ms
            },
            "qr": {
                "cycle_interval_ms": self.qr_cycle_interval_ms,
                "poll_interval_ms": self.qr_poll_interval_ms,
                "max_frames": self.qr_max_frames
            },
            "signaling": {
                "url": self.signaling_url
            }
        })
    }
}
