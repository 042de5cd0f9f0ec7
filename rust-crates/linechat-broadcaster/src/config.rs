//! Server configuration

use std::time::Duration;

use linechat_protocol::{MessageValidator, MAX_MESSAGE_LEN};
use serde::{Deserialize, Serialize};

/// Runtime settings for [`ChatServer`](crate::ChatServer)
///
/// Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on
    pub host: String,

    /// TCP port (0 = let the OS pick a free port)
    pub port: u16,

    /// Longest accepted message, in characters
    pub max_message_len: usize,

    /// Pause between dequeuing a message and fanning it out, so clients that
    /// connected in the same instant get registered first. Best effort only;
    /// 0 disables it.
    pub inclusion_window_ms: u64,

    /// How long the broadcast worker blocks on an empty queue before
    /// re-checking the server state
    pub dequeue_wait_ms: u64,

    /// Upper bound for a single write to one client
    pub write_timeout_ms: u64,

    /// How long `stop()` waits for each background task
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_message_len: MAX_MESSAGE_LEN,
            inclusion_window_ms: 5,
            dequeue_wait_ms: 100,
            write_timeout_ms: 5_000,
            shutdown_timeout_ms: 1_000,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string suitable for binding (IPv6 hosts are bracketed)
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn validator(&self) -> MessageValidator {
        MessageValidator::new(self.max_message_len)
    }

    pub fn inclusion_window(&self) -> Duration {
        Duration::from_millis(self.inclusion_window_ms)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
