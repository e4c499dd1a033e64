use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::IdleDetection;

/// ```rust,ignore
/// let config = LebaiDriverConfig::new("192.168.0.3".to_string(), 3021);
///
/// if let Err(e) = config.validate() {
///     println!("Configuration error: {}", e);
///     return;
/// }
///
/// let driver = LebaiDriver::new(config)?;
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LebaiDriverConfig {
    pub addr: String,
    pub port: u16,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub idle_detection: IdleDetection,
}

impl LebaiDriverConfig {
    pub fn new(addr: String, port: u16) -> Self {
        Self {
            addr,
            port,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.addr.trim().is_empty() {
            return Err("Address cannot be empty.".to_string());
        }
        if self.addr.contains('/') || self.addr.contains(' ') {
            return Err(format!("Address '{}' is not a host name.", self.addr));
        }
        if self.port == 0 {
            return Err("Port number must be greater than 0.".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("Request timeout must be greater than 0.".to_string());
        }
        Ok(())
    }

    /// Base URL every JSON-RPC request is posted to.
    pub fn connection_url(&self) -> String {
        format!("http://{}:{}/", self.addr.trim(), self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for LebaiDriverConfig {
    fn default() -> Self {
        Self {
            addr: "192.168.0.3".to_string(),
            port: 3021,
            request_timeout_ms: 10_000,
            idle_detection: IdleDetection::Structured,
        }
    }
}
