//! Client configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "socket_path": "/dev/socket/cnd",
//!   "reconnect_delay_ms": 4000,
//!   "standing_role": { "role": 1, "forward_bandwidth_kbps": 512 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CneError, Result};
use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, REQUEST_HEADER_SIZE};
use crate::registration::RoleRequest;
use crate::request::DEFAULT_POOL_CAPACITY;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Well-known daemon socket.
pub const DEFAULT_SOCKET_PATH: &str = "/dev/socket/cnd";

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 4000;

/// Consecutive connect failures logged at `warn` before going quiet.
pub const DEFAULT_LOUD_FAILURE_LIMIT: u32 = 8;

/// Upper bound for every synchronous round trip.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration for [`CneClient`](crate::CneClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Daemon socket path.
    pub socket_path: PathBuf,
    /// Largest payload accepted in either direction.
    pub max_frame_size: u32,
    /// Delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Failures logged loudly before switching to debug.
    pub loud_failure_limit: u32,
    /// Timeout for synchronous round trips.
    pub request_timeout_ms: u64,
    /// Writer queue capacity; a full queue blocks callers.
    pub channel_capacity: usize,
    /// Idle request buffers kept for reuse.
    pub pool_capacity: usize,
    /// Role re-registered on every (re)connect.
    pub standing_role: Option<RoleRequest>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            loud_failure_limit: DEFAULT_LOUD_FAILURE_LIMIT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            standing_role: None,
        }
    }
}

impl ClientConfig {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CneError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(CneError::Config("socket_path must not be empty".to_string()));
        }
        if (self.max_frame_size as usize) < REQUEST_HEADER_SIZE {
            return Err(CneError::Config(format!(
                "max_frame_size must be at least {}",
                REQUEST_HEADER_SIZE
            )));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(CneError::Config("reconnect_delay_ms must be > 0".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(CneError::Config("request_timeout_ms must be > 0".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(CneError::Config("channel_capacity must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(4));
        assert_eq!(config.loud_failure_limit, 8);
        assert_eq!(config.pool_capacity, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClientConfig::from_json(
            r#"{ "socket_path": "/tmp/cnd.sock", "standing_role": { "role": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/cnd.sock"));
        assert_eq!(config.standing_role.unwrap().role, 3);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[rstest]
    #[case(r#"{ "socket_path": "" }"#)]
    #[case(r#"{ "max_frame_size": 4 }"#)]
    #[case(r#"{ "reconnect_delay_ms": 0 }"#)]
    #[case(r#"{ "request_timeout_ms": 0 }"#)]
    #[case(r#"{ "channel_capacity": 0 }"#)]
    fn test_invalid_values_rejected(#[case] json: &str) {
        assert!(matches!(
            ClientConfig::from_json(json),
            Err(CneError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ClientConfig::from_json("{ nope"),
            Err(CneError::Json(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "reconnect_delay_ms": 250 }}"#).unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));

        assert!(ClientConfig::from_file("/nonexistent/cnd.json").is_err());
    }
}
