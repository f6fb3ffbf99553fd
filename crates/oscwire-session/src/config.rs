use std::path::Path;
use std::time::Duration;

use oscwire_codec::{DecodePolicy, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Default quiet period after which a heartbeat is sent.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default inbound silence after which the session disconnects.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default sleep between worker iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bound on a single send to a peer that is not reading.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Session behavior configuration.
///
/// Durations are expressed in milliseconds when serialized, e.g.
/// `{"heartbeat_interval_ms": 5000}`. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period on the outbound side before a `/ping` heartbeat is sent.
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    pub heartbeat_interval: Duration,
    /// Inbound silence after which the worker disconnects.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Sleep between worker iterations.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// How long one send may wait on a full socket buffer.
    #[serde(rename = "send_timeout_ms", with = "duration_ms")]
    pub send_timeout: Duration,
    /// Frames announcing a larger payload are skipped.
    pub max_payload_size: usize,
    /// Initial size of the receive scratch buffer.
    pub initial_buffer_capacity: usize,
    /// How received messages react to tag mismatches.
    pub decode_policy: DecodePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            initial_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(SessionError::Config(
                "idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SessionError::Config(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(SessionError::Config(
                "send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_payload_size == 0 {
            return Err(SessionError::Config(
                "max_payload_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_behavior() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.initial_buffer_capacity, 4096);
        assert_eq!(config.decode_policy, DecodePolicy::FailMessage);
    }

    #[test]
    fn json_uses_millisecond_fields_and_fills_defaults() {
        let config =
            SessionConfig::from_json_str(r#"{"heartbeat_interval_ms": 250, "decode_policy": "skip_field"}"#)
                .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.decode_policy, DecodePolicy::SkipField);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["heartbeat_interval_ms"], 250);
        assert_eq!(json["idle_timeout_ms"], 10_000);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = SessionConfig::from_json_str(r#"{"idle_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn zero_send_timeout_is_rejected() {
        let err = SessionConfig::from_json_str(r#"{"send_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));

        let config = SessionConfig::from_json_str(r#"{"send_timeout_ms": 750}"#).unwrap();
        assert_eq!(config.send_timeout, Duration::from_millis(750));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = SessionConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SessionError::Json(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = SessionConfig::from_json_file("/nonexistent/oscwire/session.json").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn builders_override_fields() {
        let config = SessionConfig::default()
            .with_heartbeat_interval(Duration::from_millis(10))
            .with_idle_timeout(Duration::from_millis(40))
            .with_poll_interval(Duration::from_millis(1))
            .with_max_payload_size(64);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(10));
        assert_eq!(config.idle_timeout, Duration::from_millis(40));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.max_payload_size, 64);
        assert!(config.validate().is_ok());
    }
}
