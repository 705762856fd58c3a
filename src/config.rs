//! Runtime configuration: plaintext settings plus a separate secrets file.

use alloy::primitives::B256;
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use url::Url;

use crate::attestation::AttestationConfig;
use crate::bundler::Chain;

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
struct Config {
    api_base_url: Url,
    log_level: Option<LogLevel>,
    chains: BTreeMap<Chain, ChainConfig>,
    attestation: Option<AttestationSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: Url,
}

#[derive(Deserialize)]
struct AttestationSettings {
    poll_interval_secs: Option<u64>,
    max_attempts: Option<usize>,
}

/// Credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
struct Secrets {
    api_key: String,
    owner_private_key: B256,
    sponsor_private_key: B256,
}

/// Combined runtime context assembled from config and secrets.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub api_base_url: Url,
    pub log_level: LogLevel,
    pub api_key: String,
    pub owner_private_key: B256,
    pub sponsor_private_key: B256,
    pub attestation: AttestationConfig,
    chains: BTreeMap<Chain, ChainConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("no RPC endpoint configured for chain {0}")]
    MissingChain(Chain),
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        let attestation = match config.attestation {
            Some(settings) => {
                let defaults = AttestationConfig::default();
                AttestationConfig {
                    poll_interval: settings
                        .poll_interval_secs
                        .map_or(defaults.poll_interval, Duration::from_secs),
                    max_attempts: settings.max_attempts.unwrap_or(defaults.max_attempts),
                }
            }
            None => AttestationConfig::default(),
        };

        Ok(Self {
            api_base_url: config.api_base_url,
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            api_key: secrets.api_key,
            owner_private_key: secrets.owner_private_key,
            sponsor_private_key: secrets.sponsor_private_key,
            attestation,
            chains: config.chains,
        })
    }

    pub fn rpc_url(&self, chain: Chain) -> Result<&Url, ConfigError> {
        self.chains
            .get(&chain)
            .map(|config| &config.rpc_url)
            .ok_or(ConfigError::MissingChain(chain))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("cctp_orchestrator={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
