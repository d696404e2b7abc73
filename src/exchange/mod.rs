//! Exchange capability used by the grid engine
//!
//! The grid controller only talks to [`ExchangeClient`]. Concrete clients are
//! [`crate::binance::BinanceClient`] for real trading and
//! [`paper::PaperExchange`] for simulation and tests. Each session builds its
//! own client through a [`ClientFactory`] so requests are always signed with
//! that session's credentials.

pub mod paper;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::grid::filters::{FilterError, SymbolFilters};
use crate::types::{OpenOrder, OrderAck, OrderId, OrderStatus, Side};

pub use paper::{PaperAccount, PaperExchange, PaperFactory, PaperOp};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("circuit breaker is open, rejecting request")]
    CircuitOpen,

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid symbol filters: {0}")]
    Filters(#[from] FilterError),

    #[error("simulated failure: {0}")]
    Simulated(String),
}

impl From<anyhow::Error> for ExchangeError {
    fn from(err: anyhow::Error) -> Self {
        ExchangeError::Request(format!("{:#}", err))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// API credentials for one user
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load from `BINANCE_API_KEY` and `BINANCE_API_SECRET`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("BINANCE_API_KEY")?;
        let api_secret = std::env::var("BINANCE_API_SECRET")?;
        Ok(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

// Never print the secret.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated spot exchange operations needed by one grid session
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Last traded price for `symbol`
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// Lot size, price and notional constraints for `symbol`
    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters>;

    /// Orders currently resting on the book for `symbol`
    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    async fn get_order_status(&self, symbol: &str, order_id: OrderId)
        -> ExchangeResult<OrderStatus>;

    /// Place a GTC limit order
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck>;
}

/// Builds a per-session exchange client from that session's credentials
pub trait ClientFactory: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> ExchangeResult<Arc<dyn ExchangeClient>>;
}
