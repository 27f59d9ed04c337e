//! Configuration module for the web3gate gateway.
//!
//! Configuration comes from a JSON file selected with `--config` (or
//! the `CONFIG` env var); listener host and port fall back to the
//! `HOST`/`PORT` environment variables and then to built-in defaults.

use alloy_primitives::Address;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use web3gate_types::decode;

/// CLI arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "web3gate")]
#[command(about = "Ethereum JSON-RPC signing gateway")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub kms: KmsConfig,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Listener binding.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "config_defaults::default_host")]
    pub host: IpAddr,
    #[serde(default = "config_defaults::default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: config_defaults::default_host(),
            port: config_defaults::default_port(),
        }
    }
}

/// Identity of the gateway at the MPC-KMS. Every field is required.
/// The secret key is excluded from `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KmsConfig {
    pub endpoint: Url,
    pub access_key_id: String,
    pub secret_key: String,
    /// Default signing key id.
    pub key_id: String,
    /// Ethereum address of the KMS-held key; the KMS API does not
    /// expose public keys, so the operator supplies it.
    pub address: String,
    /// Further KMS keys to register besides the default one. They
    /// share the endpoint and credentials above.
    #[serde(default)]
    pub additional_keys: Vec<KmsKeyConfig>,
}

/// One extra registry entry: key id plus its Ethereum address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KmsKeyConfig {
    pub key_id: String,
    pub address: String,
}

impl KmsKeyConfig {
    pub fn signer_address(&self) -> Result<Address, ConfigError> {
        decode::parse_address("kms.additional-keys.address", &self.address)
            .map_err(|e| ConfigError::InvalidValue("kms.additional-keys.address", e.to_string()))
    }
}

impl KmsConfig {
    pub fn signer_address(&self) -> Result<Address, ConfigError> {
        decode::parse_address("kms.address", &self.address)
            .map_err(|e| ConfigError::InvalidValue("kms.address", e.to_string()))
    }
}

impl std::fmt::Debug for KmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("key_id", &self.key_id)
            .field("address", &self.address)
            .field("additional_keys", &self.additional_keys)
            .finish()
    }
}

/// Where passthrough traffic goes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DownstreamConfig {
    /// Must carry an explicit `http://` or `https://` scheme.
    pub http_host: String,
    /// `0` means "use the host as-is".
    #[serde(default)]
    pub http_port: u16,
    /// A leading `/` is added when missing.
    #[serde(default)]
    pub http_path: String,
    #[serde(default = "config_defaults::default_downstream_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl DownstreamConfig {
    /// Assembles the downstream URL from host, optional port and path.
    pub fn url(&self) -> Result<Url, ConfigError> {
        if !self.http_host.starts_with("http://") && !self.http_host.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "downstream.http-host",
                format!("{:?} must begin with http:// or https://", self.http_host),
            ));
        }
        let mut assembled = self.http_host.trim_end_matches('/').to_string();
        if self.http_port != 0 {
            assembled.push_str(&format!(":{}", self.http_port));
        }
        if !self.http_path.is_empty() {
            if !self.http_path.starts_with('/') {
                assembled.push('/');
            }
            assembled.push_str(&self.http_path);
        }
        Url::parse(&assembled)
            .map_err(|e| ConfigError::InvalidValue("downstream.http-host", e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Log verbosity; `fatal` maps onto the `error` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8545;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_DOWNSTREAM_TIMEOUT_SECS: u64 = 30;

    /// Default port with fallback: $PORT env var -> 8545.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Default host with fallback: $HOST env var -> "0.0.0.0".
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().expect("valid literal")))
    }

    pub fn default_downstream_timeout_secs() -> u64 {
        DEFAULT_DOWNSTREAM_TIMEOUT_SECS
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("config value `{0}` must not be empty")]
    MissingValue(&'static str),
    #[error("invalid config value `{0}`: {1}")]
    InvalidValue(&'static str, String),
}

impl Config {
    /// Load configuration from CLI arguments and the JSON file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the KMS identity is complete and the downstream target is
    /// well-formed. Run once at startup so a bad config never serves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("kms.access-key-id", &self.kms.access_key_id),
            ("kms.secret-key", &self.kms.secret_key),
            ("kms.key-id", &self.kms.key_id),
            ("kms.address", &self.kms.address),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingValue(name));
            }
        }
        self.kms.signer_address()?;
        for key in &self.kms.additional_keys {
            if key.key_id.is_empty() {
                return Err(ConfigError::MissingValue("kms.additional-keys.key-id"));
            }
            if key.key_id == self.kms.key_id {
                return Err(ConfigError::InvalidValue(
                    "kms.additional-keys.key-id",
                    format!("{:?} duplicates the default key id", key.key_id),
                ));
            }
            key.signer_address()?;
        }
        self.downstream.url()?;
        Ok(())
    }
}
