//! Broker Configuration
//!
//! Loads configuration from environment variables.

use anyhow::Result;
use std::env;
use std::time::Duration;

/// Broker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// How long a host-issued invite remains live before it expires.
    pub invite_timeout: Duration,

    /// Width of the per-connection rate-limit window.
    pub rate_limit_window: Duration,

    /// Maximum inbound frames admitted per connection per window.
    pub rate_limit_max: u32,

    /// Interval between periodic invite-ledger sweeps.
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            invite_timeout: Duration::from_secs(
                env::var("INVITE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),
            rate_limit_window: Duration::from_secs(
                env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            rate_limit_max: env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            sweep_interval: Duration::from_secs(
                env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        })
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            invite_timeout: Duration::from_secs(20),
            rate_limit_window: Duration::from_secs(10),
            rate_limit_max: 60,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
