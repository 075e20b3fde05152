//! Typed views over the effective configuration.

use std::time::Duration;

/// Handshake session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Time allowed between applying the remote answer and switching to the
    /// fallback transport (default: 5 s; zero is allowed).
    ///
    /// `None` arms no timer: the deadline then only passes when
    /// [`HandshakeSession::fire_fallback_deadline`] is called.
    ///
    /// [`HandshakeSession::fire_fallback_deadline`]: crate::session::HandshakeSession::fire_fallback_deadline
    pub fallback_grace: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            fallback_grace: Some(Duration::from_millis(5000)),
        }
    }
}

impl HandshakeConfig {
    /// Config with an explicit grace period.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            fallback_grace: Some(grace),
        }
    }

    /// Config whose deadline is driven by hand.
    pub fn manual() -> Self {
        Self { fallback_grace: None }
    }
}

/// Visual channel settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrConfig {
    /// Time each frame of a set stays on screen (default: 275 ms)
    pub cycle_interval: Duration,

    /// Camera sampling period (default: 200 ms)
    pub poll_interval: Duration,

    /// Most recent frames kept when messages accumulate (default: 4)
    pub max_frames: usize,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_millis(275),
            poll_interval: Duration::from_millis(200),
            max_frames: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;

    #[test]
    fn test_views_match_builtin_defaults() {
        let effective = EffectiveConfig::build(None, None).unwrap();
        assert_eq!(effective.handshake(), HandshakeConfig::default());
        assert_eq!(effective.qr(), QrConfig::default());
    }

    #[test]
    fn test_manual_handshake_has_no_timer() {
        assert_eq!(HandshakeConfig::manual().fallback_grace, None);
        assert_eq!(
            HandshakeConfig::with_grace(Duration::ZERO).fallback_grace,
            Some(Duration::ZERO)
        );
    }
}
