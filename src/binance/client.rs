//! Binance spot REST client
//!
//! HTTP client for the grid engine with:
//! - Retry with exponential backoff for reads
//! - Token-bucket rate limiting
//! - Circuit breaker shared by all requests of one client
//!
//! Order placement is sent exactly once. A timed-out POST may still have
//! reached the matching engine, so it is never replayed.
//!
//! # Example
//!
//! ```no_run
//! use spot_grid::binance::{BinanceClient, ClientConfig};
//! use spot_grid::exchange::{Credentials, ExchangeClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::from_env()?;
//!     let client = BinanceClient::with_config(Some(credentials), ClientConfig::default())?;
//!
//!     let price = client.get_price("BTCUSDT").await?;
//!     println!("BTCUSDT: {}", price);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::auth::signed_query;
use super::types::*;
use crate::common::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig};
use crate::exchange::{
    ClientFactory, Credentials, ExchangeClient, ExchangeError, ExchangeResult,
};
use crate::grid::filters::SymbolFilters;
use crate::types::{OpenOrder, OrderAck, OrderId, OrderStatus, Side};

/// Base URL for the Binance spot API
pub const API_BASE_URL: &str = "https://api.binance.com";

/// Binance error code for an unknown symbol
const INVALID_SYMBOL: i64 = -1121;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, overridable for the testnet
    pub base_url: String,
    /// Maximum number of retry attempts for reads
    pub max_retries: u32,
    /// Request timeout duration
    pub timeout: Duration,
    /// `recvWindow` sent with signed requests, in milliseconds
    pub recv_window_ms: u64,
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            max_retries: 3,
            timeout: Duration::from_secs(30),
            recv_window_ms: 5000,
            rate_limiter: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Set rate limit (requests per second)
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }

    /// Set circuit breaker failure threshold
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_failure_threshold(threshold);
        self
    }
}

#[derive(Debug, Error)]
#[error("circuit breaker is open, rejecting request")]
struct CircuitOpen;

#[derive(Debug, Error)]
#[error("no API credentials configured for signed endpoint")]
struct MissingCredentials;

/// Binance spot API client
///
/// Without credentials only the public endpoints (price, exchange info) work.
#[derive(Clone)]
pub struct BinanceClient {
    credentials: Option<Credentials>,
    http_client: Client,
    base_url: String,
    recv_window_ms: u64,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    /// Wire precision per symbol, learned from exchangeInfo
    precision: Arc<StdMutex<HashMap<String, WirePrecision>>>,
    rate_limiter: RateLimiter,
    max_retries: u32,
}

impl BinanceClient {
    /// Create a client with default configuration
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(Some(credentials), ClientConfig::default())
    }

    /// Client for public market data only
    pub fn public(config: ClientConfig) -> Result<Self> {
        Self::with_config(None, config)
    }

    pub fn with_config(credentials: Option<Credentials>, config: ClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            credentials,
            http_client,
            base_url: config.base_url,
            recv_window_ms: config.recv_window_ms,
            circuit_breaker: Arc::new(Mutex::new(CircuitBreaker::new(config.circuit_breaker))),
            precision: Arc::new(StdMutex::new(HashMap::new())),
            rate_limiter: RateLimiter::new(config.rate_limiter),
            max_retries: config.max_retries,
        })
    }

    /// Create a client from `BINANCE_API_KEY` / `BINANCE_API_SECRET`
    pub fn from_env() -> Result<Self> {
        let credentials = Credentials::from_env()
            .context("Failed to load Binance credentials from environment")?;
        Self::new(credentials)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Execute a request with rate limiting and the circuit breaker, retrying
    /// transient failures when `retry` is set
    async fn execute<F, Fut, T>(&self, retry: bool, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        {
            let mut cb = self.circuit_breaker.lock().await;
            if !cb.admit() {
                return Err(CircuitOpen.into());
            }
        }

        let attempts = if retry { self.max_retries + 1 } else { 1 };
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s...
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tracing::debug!("Retrying after {}ms", delay.as_millis());
                sleep(delay).await;
            }

            self.rate_limiter.acquire().await;

            match operation().await {
                Ok(result) => {
                    self.circuit_breaker.lock().await.on_success();
                    return Ok(result);
                }
                Err(e) => {
                    // The exchange answered; it is healthy and the request is wrong
                    if is_client_error(&e) {
                        self.circuit_breaker.lock().await.on_success();
                        return Err(e);
                    }
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {:#}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        self.circuit_breaker.lock().await.on_failure();

        Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| MissingCredentials.into())
    }

    /// Query string with `recvWindow`, a fresh `timestamp` and `signature`
    fn sign(&self, params: &[(&str, String)], secret: &str) -> String {
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", self.recv_window_ms.to_string()));
        all.push((
            "timestamp",
            chrono::Utc::now().timestamp_millis().to_string(),
        ));
        signed_query(&all, secret)
    }

    /// Signed GET, re-signed on every attempt so the timestamp stays fresh
    async fn signed_get<R>(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let credentials = self.credentials()?.clone();
        let url = self.url(endpoint);

        self.execute(true, || {
            let query = self.sign(&params, credentials.api_secret());
            let request = self
                .http_client
                .get(format!("{}?{}", url, query))
                .header("X-MBX-APIKEY", credentials.api_key());

            async move {
                let text = send(request).await?;
                serde_json::from_str(&text).context("Failed to parse response")
            }
        })
        .await
    }

    /// Signed POST, sent once
    async fn signed_post<R>(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let credentials = self.credentials()?.clone();
        let url = self.url(endpoint);

        self.execute(false, || {
            let query = self.sign(&params, credentials.api_secret());
            let request = self
                .http_client
                .post(format!("{}?{}", url, query))
                .header("X-MBX-APIKEY", credentials.api_key());

            async move {
                let text = send(request).await?;
                serde_json::from_str(&text).context("Failed to parse response")
            }
        })
        .await
    }

    async fn public_get<R>(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = self.url(endpoint);

        self.execute(true, || {
            let request = self.http_client.get(&url).query(&params);

            async move {
                let text = send(request).await?;
                serde_json::from_str(&text).context("Failed to parse response")
            }
        })
        .await
    }

    // ==================== PUBLIC ENDPOINTS ====================

    /// Latest price for a symbol
    pub async fn ticker_price(&self, symbol: &str) -> Result<TickerPrice> {
        self.public_get("/api/v3/ticker/price", vec![("symbol", symbol.to_string())])
            .await
            .with_context(|| format!("Failed to fetch price for {}", symbol))
    }

    /// Trading rules for a symbol
    pub async fn exchange_info(&self, symbol: &str) -> Result<ExchangeInfo> {
        self.public_get("/api/v3/exchangeInfo", vec![("symbol", symbol.to_string())])
            .await
            .with_context(|| format!("Failed to fetch exchange info for {}", symbol))
    }

    // ==================== AUTHENTICATED ENDPOINTS ====================

    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderInfo>> {
        self.signed_get("/api/v3/openOrders", vec![("symbol", symbol.to_string())])
            .await
            .with_context(|| format!("Failed to fetch open orders for {}", symbol))
    }

    pub async fn query_order(&self, symbol: &str, order_id: OrderId) -> Result<OrderInfo> {
        self.signed_get(
            "/api/v3/order",
            vec![
                ("symbol", symbol.to_string()),
                ("orderId", order_id.to_string()),
            ],
        )
        .await
        .with_context(|| format!("Failed to query order {}", order_id))
    }

    /// Place a GTC limit order. Quantity and price are truncated to the
    /// symbol's wire precision: 6 and 4 decimals, or the step and tick scale
    /// once filters were loaded for a symbol with finer increments.
    pub async fn new_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<NewOrderResponse> {
        let params = limit_order_params(symbol, side, quantity, price, self.wire_precision(symbol));
        self.signed_post("/api/v3/order", params)
            .await
            .with_context(|| format!("Failed to place {} order on {}", side, symbol))
    }

    pub fn wire_precision(&self, symbol: &str) -> WirePrecision {
        self.precision
            .lock()
            .map(|cache| cache.get(symbol).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    fn remember_filters(&self, symbol: &str, filters: &SymbolFilters) {
        if let Ok(mut cache) = self.precision.lock() {
            cache.insert(symbol.to_string(), WirePrecision::for_filters(filters));
        }
    }
}

/// Parameters for `POST /api/v3/order`
pub fn limit_order_params(
    symbol: &str,
    side: Side,
    quantity: Decimal,
    price: Decimal,
    precision: WirePrecision,
) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", symbol.to_string()),
        ("side", side.as_str().to_string()),
        ("type", "LIMIT".to_string()),
        ("timeInForce", "GTC".to_string()),
        ("quantity", format_fixed(quantity, precision.quantity)),
        ("price", format_fixed(price, precision.price)),
    ]
}

/// Send a request and return the body, turning non-2xx into [`ApiError`]
async fn send(request: RequestBuilder) -> Result<String> {
    let response = request.send().await.context("Failed to send request")?;
    let status = response.status();
    let text = response.text().await.context("Failed to read response")?;

    if !status.is_success() {
        return Err(ApiError::from_response(status.as_u16(), &text).into());
    }
    Ok(text)
}

fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}

fn is_client_error(err: &anyhow::Error) -> bool {
    api_error(err).is_some_and(ApiError::is_client_error)
}

/// Map a client error onto the engine's error type
fn classify(err: anyhow::Error, symbol: &str, order_id: Option<OrderId>) -> ExchangeError {
    if err.chain().any(|cause| cause.is::<CircuitOpen>()) {
        return ExchangeError::CircuitOpen;
    }
    match api_error(&err).and_then(|api| api.code) {
        Some(ApiError::ORDER_DOES_NOT_EXIST) => {
            if let Some(id) = order_id {
                return ExchangeError::OrderNotFound(id);
            }
        }
        Some(INVALID_SYMBOL) => return ExchangeError::SymbolNotFound(symbol.to_string()),
        _ => {}
    }
    ExchangeError::from(err)
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let ticker = self
            .ticker_price(symbol)
            .await
            .map_err(|e| classify(e, symbol, None))?;
        Ok(ticker.price)
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        let info = self
            .exchange_info(symbol)
            .await
            .map_err(|e| classify(e, symbol, None))?;

        let entry = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;

        let filters = entry
            .to_filters()
            .map_err(|e| ExchangeError::InvalidResponse(format!("{:#}", e)))?;
        self.remember_filters(symbol, &filters);
        Ok(filters)
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let orders = self
            .open_orders(symbol)
            .await
            .map_err(|e| classify(e, symbol, None))?;
        Ok(orders.into_iter().map(OpenOrder::from).collect())
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderStatus> {
        let order = self
            .query_order(symbol, order_id)
            .await
            .map_err(|e| classify(e, symbol, Some(order_id)))?;
        Ok(OrderStatus::from_wire(&order.status))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let response = self
            .new_limit_order(symbol, side, quantity, price)
            .await
            .map_err(|e| classify(e, symbol, None))?;

        tracing::debug!(
            "Order {} accepted: {} {} @ {} ({})",
            response.order_id,
            side,
            quantity,
            price,
            response.status.as_deref().unwrap_or("UNKNOWN")
        );

        Ok(OrderAck {
            order_id: response.order_id,
        })
    }
}

/// Builds one [`BinanceClient`] per session, each with its own credentials,
/// rate limiter and circuit breaker
#[derive(Debug, Clone, Default)]
pub struct BinanceFactory {
    config: ClientConfig,
}

impl BinanceFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for BinanceFactory {
    fn connect(&self, credentials: &Credentials) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        let client = BinanceClient::with_config(Some(credentials.clone()), self.config.clone())?;
        Ok(Arc::new(client))
    }
}
