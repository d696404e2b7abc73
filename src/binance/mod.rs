//! Binance spot exchange integration
//!
//! - [`BinanceClient`]: REST client with retry, rate limiting and circuit breaker
//! - [`BinanceFactory`]: per-session client construction for the supervisor
//! - HMAC-SHA256 request signing
//! - Wire models for prices, exchange info and orders

pub mod auth;
pub mod client;
pub mod types;

pub use client::{BinanceClient, BinanceFactory, ClientConfig, API_BASE_URL};
pub use types::{ApiError, ExchangeInfo, OrderInfo, SymbolInfo, TickerPrice, WirePrecision};
