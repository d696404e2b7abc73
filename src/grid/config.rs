//! Grid Controller Configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be > 0 (got {value})")]
    NotPositive { name: &'static str, value: String },

    #[error("{name} must be in [0, 1) (got {value})")]
    RatioOutOfRange { name: &'static str, value: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Drop from the base price, in percent, that triggers a buy (default: 0.6)
    #[serde(default = "default_percentage_drop")]
    pub percentage_drop: Decimal,

    /// Rise from the base price, in percent, that re-centers the grid (default: 1.2)
    #[serde(default = "default_percentage_rise")]
    pub percentage_rise: Decimal,

    /// Quote amount spent per buy order (default: 15)
    #[serde(default = "default_investment_amount")]
    pub investment_amount: Decimal,

    /// Buy limit sits this fraction below the current price (default: 0.01)
    #[serde(default = "default_entry_discount")]
    pub entry_discount: Decimal,

    /// Sell limit sits this fraction above the filled buy price (default: 0.012)
    #[serde(default = "default_target_profit_ratio")]
    pub target_profit_ratio: Decimal,

    /// Polling interval in milliseconds (default: 120000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Only manage existing orders, never open new buys
    #[serde(default)]
    pub no_buys: bool,
}

fn default_percentage_drop() -> Decimal {
    dec!(0.6)
}

fn default_percentage_rise() -> Decimal {
    dec!(1.2)
}

fn default_investment_amount() -> Decimal {
    dec!(15)
}

fn default_entry_discount() -> Decimal {
    dec!(0.01)
}

fn default_target_profit_ratio() -> Decimal {
    dec!(0.012)
}

fn default_poll_interval_ms() -> u64 {
    120_000
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            percentage_drop: default_percentage_drop(),
            percentage_rise: default_percentage_rise(),
            investment_amount: default_investment_amount(),
            entry_discount: default_entry_discount(),
            target_profit_ratio: default_target_profit_ratio(),
            poll_interval_ms: default_poll_interval_ms(),
            no_buys: false,
        }
    }
}

impl GridConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn buys_enabled(&self) -> bool {
        !self.no_buys
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("percentage_drop", self.percentage_drop),
            ("percentage_rise", self.percentage_rise),
            ("investment_amount", self.investment_amount),
        ] {
            if value <= Decimal::ZERO {
                return Err(ConfigError::NotPositive {
                    name,
                    value: value.to_string(),
                });
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                name: "poll_interval_ms",
                value: "0".to_string(),
            });
        }
        for (name, value) in [
            ("entry_discount", self.entry_discount),
            ("target_profit_ratio", self.target_profit_ratio),
        ] {
            if value < Decimal::ZERO || value >= Decimal::ONE {
                return Err(ConfigError::RatioOutOfRange { name, value });
            }
        }
        Ok(())
    }

    pub fn with_percentage_drop(mut self, pct: Decimal) -> Self {
        self.percentage_drop = pct;
        self
    }

    pub fn with_percentage_rise(mut self, pct: Decimal) -> Self {
        self.percentage_rise = pct;
        self
    }

    pub fn with_investment_amount(mut self, amount: Decimal) -> Self {
        self.investment_amount = amount;
        self
    }

    pub fn with_entry_discount(mut self, ratio: Decimal) -> Self {
        self.entry_discount = ratio;
        self
    }

    pub fn with_target_profit_ratio(mut self, ratio: Decimal) -> Self {
        self.target_profit_ratio = ratio;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_no_buys(mut self, no_buys: bool) -> Self {
        self.no_buys = no_buys;
        self
    }
}
