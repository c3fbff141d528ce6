//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the poller.
//! Configuration includes the wallet backend connection and polling cadence.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure.
///
/// This structure holds configuration for:
/// - Wallet backend connection (URL, auth, timeouts)
/// - Polling cadence, local expiry clock and amount limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Wallet backend connection
    pub service: ServiceConfig,
    /// Polling behaviour (defaults apply when the section is omitted)
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Wallet backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Wallet backend base URL (e.g., "http://127.0.0.1:8000/api")
    pub backend_url: String,
    /// Environment variable holding the bearer token, if the backend requires one
    #[serde(default)]
    pub auth_token_env: Option<String>,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Polling cadence and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between status polls in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Tick of the local expiry clock in milliseconds
    #[serde(default = "default_clock_tick_ms")]
    pub clock_tick_ms: u64,
    /// Smallest amount accepted for a deposit, written as a decimal string (e.g. "0.01")
    #[serde(default = "default_min_amount", with = "rust_decimal::serde::str")]
    pub min_amount: Decimal,
    /// Expiry window applied when the backend does not send one
    #[serde(default = "default_expiry_secs")]
    pub default_expiry_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            clock_tick_ms: default_clock_tick_ms(),
            min_amount: default_min_amount(),
            default_expiry_secs: default_expiry_secs(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_clock_tick_ms() -> u64 {
    1_000
}

fn default_min_amount() -> Decimal {
    Decimal::new(1, 2)
}

fn default_expiry_secs() -> u64 {
    30 * 60
}

impl PollerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Resolves the path (argument, then PIX_POLLER_CONFIG_PATH env var, then config/pix-poller.toml)
    /// 2. If it exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses PIX_POLLER_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(PollerConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("PIX_POLLER_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/pix-poller.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: PollerConfig = toml::from_str(&content)?;

            config.validate()?;

            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/pix-poller.template.toml config/pix-poller.toml\n\
                Then edit config/pix-poller.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    ///
    /// This is equivalent to calling `load_from_path(None)`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - Backend URL is an http(s) URL
    /// - Timeouts, intervals and expiry window are non-zero
    /// - Minimum amount is positive
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.service.backend_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "service.backend_url must start with http:// or https:// (got '{}')",
                self.service.backend_url
            ));
        }

        if self.service.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("service.request_timeout_ms must be greater than 0"));
        }

        if self.polling.interval_ms == 0 {
            return Err(anyhow::anyhow!("polling.interval_ms must be greater than 0"));
        }

        if self.polling.clock_tick_ms == 0 {
            return Err(anyhow::anyhow!("polling.clock_tick_ms must be greater than 0"));
        }

        if self.polling.default_expiry_secs == 0 {
            return Err(anyhow::anyhow!("polling.default_expiry_secs must be greater than 0"));
        }

        if self.polling.min_amount <= Decimal::ZERO {
            return Err(anyhow::anyhow!(
                "polling.min_amount must be positive (got {})",
                self.polling.min_amount
            ));
        }

        Ok(())
    }

    /// Reads the bearer token from the configured environment variable.
    ///
    /// Returns `None` when no variable is configured or it is unset.
    pub fn auth_token(&self) -> Option<String> {
        self.service
            .auth_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
    }
}
