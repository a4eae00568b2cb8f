//! Configuration management
//!
//! Settings are read from an optional TOML file and then overridden by
//! `BOTPNL__SECTION__KEY` environment variables. Every field has a default so
//! the engine can start with no file at all.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Exchange hosts, signing constants and the sub-account naming convention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_spot_url")]
    pub spot_url: String,
    #[serde(default = "default_futures_url")]
    pub futures_url: String,
    /// Per-call timeout, independent of the orchestrator deadline
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_key_version")]
    pub key_version: String,
    /// Prefix of the auth header family, e.g. `KC-API` -> `KC-API-SIGN`
    #[serde(default = "default_header_prefix")]
    pub header_prefix: String,
    /// Sub-accounts whose name starts with this are trading bots
    #[serde(default = "default_bot_prefix")]
    pub bot_prefix: String,
    /// Name the derivatives overview uses for the master account
    #[serde(default = "default_main_account_name")]
    pub main_account_name: String,
    #[serde(default = "default_stable_currencies")]
    pub stable_currencies: Vec<String>,
    /// Master `/api/v1/accounts` types counted as spot holdings; margin
    /// lines include borrowed funds and are left out
    #[serde(default = "default_spot_account_types")]
    pub spot_account_types: Vec<String>,
    /// Settlement currency requested from the derivatives overview
    #[serde(default = "default_overview_currency")]
    pub overview_currency: String,
    #[serde(default = "default_max_sub_account_pages")]
    pub max_sub_account_pages: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            spot_url: default_spot_url(),
            futures_url: default_futures_url(),
            request_timeout_secs: default_request_timeout_secs(),
            key_version: default_key_version(),
            header_prefix: default_header_prefix(),
            bot_prefix: default_bot_prefix(),
            main_account_name: default_main_account_name(),
            stable_currencies: default_stable_currencies(),
            spot_account_types: default_spot_account_types(),
            overview_currency: default_overview_currency(),
            max_sub_account_pages: default_max_sub_account_pages(),
        }
    }
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_stable_currency(&self, currency: &str) -> bool {
        self.stable_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }

    pub fn is_spot_account_type(&self, account_type: &str) -> bool {
        self.spot_account_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(account_type))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before attempt n+1 is `n * backoff_step_ms`
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    /// Hard deadline for a whole refresh
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl RetryConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms * attempt as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Database path with `~` and environment variables expanded
    pub fn resolved_path(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(p) => PathBuf::from(p.into_owned()),
            Err(_) => PathBuf::from(&self.path),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_spot_url() -> String {
    "https://api.kucoin.com".to_string()
}
fn default_futures_url() -> String {
    "https://api-futures.kucoin.com".to_string()
}
fn default_request_timeout_secs() -> u64 {
    12
}
fn default_key_version() -> String {
    "3".to_string()
}
fn default_header_prefix() -> String {
    "KC-API".to_string()
}
fn default_bot_prefix() -> String {
    "robot".to_string()
}
fn default_main_account_name() -> String {
    "main".to_string()
}
fn default_stable_currencies() -> Vec<String> {
    vec!["USDT".to_string(), "USDC".to_string()]
}
fn default_spot_account_types() -> Vec<String> {
    vec!["main".to_string(), "trade".to_string(), "trade_hf".to_string()]
}
fn default_overview_currency() -> String {
    "USDT".to_string()
}
fn default_max_sub_account_pages() -> u32 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_step_ms() -> u64 {
    1000
}
fn default_deadline_secs() -> u64 {
    20
}
fn default_db_path() -> String {
    "data/bot_pnl.db".to_string()
}

impl Config {
    /// Load configuration from a TOML file (if it exists) plus environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("BOTPNL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("exchange.stable_currencies")
                    .with_list_parse_key("exchange.spot_account_types")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
