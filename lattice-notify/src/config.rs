//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by every dispatcher of a hub.
///
/// Deserializes with defaults for missing fields:
///
/// ```rust
/// use lattice_notify::NotifyConfig;
///
/// let config = NotifyConfig::from_json(r#"{ "slow_listener_threshold_ms": 50 }"#).unwrap();
/// assert!(config.catch_panics);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Report a panicking listener as a failure instead of unwinding through
    /// the publisher.
    pub catch_panics: bool,

    /// Log a warning when a single callback runs longer than this. The
    /// callback is never interrupted.
    pub slow_listener_threshold_ms: Option<u64>,
}

impl NotifyConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn slow_listener_threshold(&self) -> Option<Duration> {
        self.slow_listener_threshold_ms.map(Duration::from_millis)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            slow_listener_threshold_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = NotifyConfig::from_json("{}").unwrap();
        assert_eq!(config, NotifyConfig::default());
        assert!(config.slow_listener_threshold().is_none());
    }

    #[test]
    fn threshold_converts_to_duration() {
        let config =
            NotifyConfig::from_json(r#"{ "catch_panics": false, "slow_listener_threshold_ms": 25 }"#)
                .unwrap();
        assert!(!config.catch_panics);
        assert_eq!(
            config.slow_listener_threshold(),
            Some(Duration::from_millis(25))
        );
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(NotifyConfig::from_json(r#"{ "catch_panics": "yes" }"#).is_err());
    }
}
