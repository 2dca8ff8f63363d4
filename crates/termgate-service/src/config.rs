//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use termgate_core::{AccountKey, Credentials};
use termgate_dispatch::DispatcherConfig;
use termgate_reconcile::ReconcilerConfig;

/// One external terminal account the gateway serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Owner identifier, scopes the account inside the gateway.
    pub user_id: String,
    /// Terminal login number.
    pub login: u64,
    /// Terminal password.
    pub password: String,
    /// Broker server name (e.g., "Demo-Server").
    pub server: String,
}

impl AccountConfig {
    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.login, &self.server, &self.user_id)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.login, &self.password, &self.server)
    }
}

/// Trade record persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Output directory for daily trade record files. Default: "data".
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Accounts polled by the service loop.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Snapshot polling interval per account (ms). Default: 2,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Tracker inbox depth. Default: 64.
    #[serde(default = "default_tracker_queue_depth")]
    pub tracker_queue_depth: usize,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_tracker_queue_depth() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            tracker_queue_depth: default_tracker_queue_depth(),
            dispatcher: DispatcherConfig::default(),
            reconciler: ReconcilerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("TERMGATE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.accounts.is_empty());
        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.dispatcher.cache_ttl_ms, 2_000);
        assert_eq!(config.reconciler.max_retries, 3);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            poll_interval_ms = 1000

            [[accounts]]
            user_id = "u1"
            login = 12345
            password = "secret"
            server = "Demo-Server"

            [dispatcher]
            cache_ttl_ms = 500

            [reconciler]
            max_retries = 5

            [persistence]
            data_dir = "/tmp/trades"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].login, 12345);
        assert_eq!(config.accounts[0].key().to_string(), "12345@Demo-Server/u1");
        assert_eq!(config.dispatcher.cache_ttl_ms, 500);
        // Unset fields keep their defaults.
        assert_eq!(config.dispatcher.request_timeout_ms, 10_000);
        assert_eq!(config.reconciler.max_retries, 5);
        assert_eq!(config.persistence.data_dir, "/tmp/trades");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("poll_interval_ms"));
        assert!(toml_str.contains("data_dir"));
    }

    #[test]
    fn test_credentials_from_account() {
        let account = AccountConfig {
            user_id: "u1".to_string(),
            login: 77,
            password: "pw".to_string(),
            server: "Live".to_string(),
        };
        let creds = account.credentials();
        assert_eq!(creds.login, 77);
        assert_eq!(creds.server, "Live");
    }
}
