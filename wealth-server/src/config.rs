//! Server Configuration
//!
//! Loaded from an optional `wealth-server.toml` next to the working
//! directory, then `WEALTH_*` environment variables (a `.env` file is read
//! first).

use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::devnet::DevnetConfig;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// CORS allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Chain id -> deployment table
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// JSON file for decryption signatures; kept in memory when unset
    pub signature_store_path: Option<PathBuf>,

    /// Validity of a new decryption signature
    #[serde(default = "default_signature_duration_days")]
    pub signature_duration_days: u32,

    /// Delay before the balance refresh that follows a mined transaction
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,

    #[serde(default = "default_devnet_chain_id")]
    pub devnet_chain_id: u64,

    #[serde(default = "default_devnet_chain_name")]
    pub devnet_chain_name: String,

    /// Number of dev accounts
    #[serde(default = "default_devnet_accounts")]
    pub devnet_accounts: usize,

    /// Seed for dev account keys
    #[serde(default = "default_devnet_seed")]
    pub devnet_seed: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("deployments/addresses.json")
}

fn default_signature_duration_days() -> u32 {
    365
}

fn default_refresh_delay_ms() -> u64 {
    1000
}

fn default_devnet_chain_id() -> u64 {
    DevnetConfig::default().chain_id
}

fn default_devnet_chain_name() -> String {
    DevnetConfig::default().chain_name
}

fn default_devnet_accounts() -> usize {
    DevnetConfig::default().accounts
}

fn default_devnet_seed() -> String {
    DevnetConfig::default().seed
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            json_logs: false,
            cors_origins: default_cors_origins(),
            registry_path: default_registry_path(),
            signature_store_path: None,
            signature_duration_days: default_signature_duration_days(),
            refresh_delay_ms: default_refresh_delay_ms(),
            devnet_chain_id: default_devnet_chain_id(),
            devnet_chain_name: default_devnet_chain_name(),
            devnet_accounts: default_devnet_accounts(),
            devnet_seed: default_devnet_seed(),
        }
    }
}

impl Config {
    /// Load configuration from `wealth-server.toml` and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        config::Config::builder()
            .add_source(config::File::with_name("wealth-server").required(false))
            .add_source(
                config::Environment::with_prefix("WEALTH")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?
            .try_deserialize()
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn devnet(&self) -> DevnetConfig {
        DevnetConfig {
            chain_id: self.devnet_chain_id,
            chain_name: self.devnet_chain_name.clone(),
            accounts: self.devnet_accounts,
            seed: self.devnet_seed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert_eq!(config.refresh_delay(), Duration::from_secs(1));
        assert_eq!(config.signature_duration_days, 365);
        assert_eq!(config.devnet().chain_id, 31337);
        assert!(config.signature_store_path.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "port = 8080\nrefresh_delay_ms = 0\ndevnet_chain_name = \"localhost\"",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.refresh_delay(), Duration::ZERO);
        assert_eq!(config.devnet().chain_name, "localhost");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.registry_path, PathBuf::from("deployments/addresses.json"));
    }

    #[test]
    fn test_invalid_host_is_an_error() {
        let config = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
