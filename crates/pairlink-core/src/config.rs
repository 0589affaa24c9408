//! Configuration types for Pairlink

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for Pairlink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// How long a pairing request stays redeemable, in milliseconds
    pub pairing_ttl_ms: u64,
    /// How long an initiator waits for confirmation, in milliseconds
    pub confirm_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            pairing_ttl_ms: 60_000,
            confirm_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set pairing TTL
    pub fn with_pairing_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.pairing_ttl_ms = ttl_ms;
        self
    }

    /// Builder pattern: set confirmation timeout
    pub fn with_confirm_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.confirm_timeout_ms = timeout_ms;
        self
    }

    pub fn pairing_ttl(&self) -> Duration {
        Duration::from_millis(self.pairing_ttl_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}
