//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials.

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::binance::{ClientConfig, API_BASE_URL};
use crate::exchange::Credentials;
use crate::grid::GridConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Defaults shared by every session
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load API credentials from environment if not set
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            config.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            config.exchange.api_secret = Some(api_secret);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every session's effective grid parameters and reject duplicates
    pub fn validate(&self) -> Result<()> {
        for (i, session) in self.sessions.iter().enumerate() {
            self.grid_for(session)
                .validate()
                .with_context(|| format!("Invalid grid config for session {}", session.label()))?;

            if self.sessions[..i]
                .iter()
                .any(|other| other.user == session.user && other.symbol == session.symbol)
            {
                bail!("Duplicate session {}", session.label());
            }
        }
        Ok(())
    }

    /// Shared grid defaults with the session's overrides applied
    pub fn grid_for(&self, session: &SessionConfig) -> GridConfig {
        match &session.grid {
            Some(overrides) => overrides.apply(&self.grid),
            None => self.grid.clone(),
        }
    }

    /// Session credentials. The exchange-level pair (or `BINANCE_API_KEY` /
    /// `BINANCE_API_SECRET`) is a fallback only while every session belongs to
    /// one user; with several users each session must carry its own keys.
    pub fn credentials_for(&self, session: &SessionConfig) -> Result<Credentials> {
        let shared = if self.is_multi_user() {
            if session.api_key.is_none() || session.api_secret.is_none() {
                bail!(
                    "Session {} needs its own api_key and api_secret when several users are configured",
                    session.label()
                );
            }
            None
        } else {
            Some(&self.exchange)
        };

        let api_key = session
            .api_key
            .as_ref()
            .or(shared.and_then(|e| e.api_key.as_ref()))
            .ok_or_else(|| anyhow!("No API key for session {}", session.label()))?;
        let api_secret = session
            .api_secret
            .as_ref()
            .or(shared.and_then(|e| e.api_secret.as_ref()))
            .ok_or_else(|| anyhow!("No API secret for session {}", session.label()))?;

        Ok(Credentials::new(api_key.clone(), api_secret.clone()))
    }

    fn is_multi_user(&self) -> bool {
        match self.sessions.first() {
            Some(first) => self.sessions.iter().any(|s| s.user != first.user),
            None => false,
        }
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Requests per second per session
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_rate_limit() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_recv_window_ms() -> u64 {
    5000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: default_base_url(),
            api_key: None,
            api_secret: None,
            rate_limit: default_rate_limit(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

impl ExchangeConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_rate_limit(self.rate_limit)
            .with_max_retries(self.max_retries)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_recv_window(self.recv_window_ms)
    }
}

/// One grid session: a user trading one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridOverrides>,
}

impl SessionConfig {
    pub fn new(user: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            symbol: symbol.into(),
            api_key: None,
            api_secret: None,
            grid: None,
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.user, self.symbol)
    }
}

/// Per-session replacements for individual [`GridConfig`] fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_drop: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_rise: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_discount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_profit_ratio: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_buys: Option<bool>,
}

impl GridOverrides {
    pub fn apply(&self, base: &GridConfig) -> GridConfig {
        GridConfig {
            percentage_drop: self.percentage_drop.unwrap_or(base.percentage_drop),
            percentage_rise: self.percentage_rise.unwrap_or(base.percentage_rise),
            investment_amount: self.investment_amount.unwrap_or(base.investment_amount),
            entry_discount: self.entry_discount.unwrap_or(base.entry_discount),
            target_profit_ratio: self.target_profit_ratio.unwrap_or(base.target_profit_ratio),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            no_buys: self.no_buys.unwrap_or(base.no_buys),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
        "exchange": { "rate_limit": 5, "api_key": "k", "api_secret": "s" },
        "grid": { "percentage_drop": "0.8", "investment_amount": "20" },
        "sessions": [
            { "user": "alice", "symbol": "ETHUSDT", "api_key": "ak", "api_secret": "as" },
            { "user": "bob", "symbol": "BTCUSDT", "api_key": "bk", "api_secret": "bs",
              "grid": { "investment_amount": "50", "no_buys": true } }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.exchange.rate_limit, 5);
        assert_eq!(config.exchange.base_url, API_BASE_URL);
        assert_eq!(config.exchange.recv_window_ms, 5000);

        assert_eq!(config.grid.percentage_drop, dec!(0.8));
        assert_eq!(config.grid.percentage_rise, dec!(1.2));
        assert_eq!(config.sessions.len(), 2);
    }

    #[test]
    fn test_session_overrides() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();

        let alice = config.grid_for(&config.sessions[0]);
        assert_eq!(alice.investment_amount, dec!(20));
        assert!(alice.buys_enabled());

        let bob = config.grid_for(&config.sessions[1]);
        assert_eq!(bob.investment_amount, dec!(50));
        assert_eq!(bob.percentage_drop, dec!(0.8));
        assert!(!bob.buys_enabled());
    }

    #[test]
    fn test_credentials_per_session() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();

        let alice = config.credentials_for(&config.sessions[0]).unwrap();
        assert_eq!(alice.api_key(), "ak");
        let bob = config.credentials_for(&config.sessions[1]).unwrap();
        assert_eq!(bob.api_key(), "bk");
        assert_eq!(bob.api_secret(), "bs");

        let bare = Config::default();
        assert!(bare
            .credentials_for(&SessionConfig::new("carol", "ETHUSDT"))
            .is_err());
    }

    #[test]
    fn test_single_user_falls_back_to_exchange_keys() {
        let mut config: Config = serde_json::from_str(SAMPLE).unwrap();
        config.sessions = vec![
            SessionConfig::new("alice", "ETHUSDT"),
            SessionConfig::new("alice", "SOLUSDT"),
        ];

        for session in &config.sessions {
            let credentials = config.credentials_for(session).unwrap();
            assert_eq!(credentials.api_key(), "k");
            assert_eq!(credentials.api_secret(), "s");
        }
    }

    #[test]
    fn test_several_users_never_share_exchange_keys() {
        let mut config: Config = serde_json::from_str(SAMPLE).unwrap();
        config.sessions[0].api_key = None;
        config.sessions[0].api_secret = None;

        let err = config.credentials_for(&config.sessions[0]).unwrap_err();
        assert!(err.to_string().contains("alice/ETHUSDT"));
        assert_eq!(config.credentials_for(&config.sessions[1]).unwrap().api_key(), "bk");

        config.sessions[0].api_key = Some("ak".to_string());
        assert!(config.credentials_for(&config.sessions[0]).is_err());
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let mut config = Config::default();
        config.sessions.push(SessionConfig::new("alice", "ETHUSDT"));
        config.sessions.push(SessionConfig::new("alice", "ETHUSDT"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = Config::default();
        let mut session = SessionConfig::new("alice", "ETHUSDT");
        session.grid = Some(GridOverrides {
            investment_amount: Some(Decimal::ZERO),
            ..Default::default()
        });
        config.sessions.push(session);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_config_from_exchange_section() {
        let exchange = ExchangeConfig {
            base_url: "https://testnet.binance.vision".to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        let client = exchange.client_config();
        assert_eq!(client.base_url, "https://testnet.binance.vision");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
