//! Spot Grid Trading Bot
//!
//! Percentage-grid trading engine for Binance spot markets. Each session
//! watches one symbol for one user: a drop from the base price opens a buy,
//! a filled buy gets a profit-taking sell, and a rise re-centers the grid.
//!
//! # Modules
//!
//! - [`grid`]: quantization, order ledger and the polling controller
//! - [`session`]: supervisor running one background task per (user, symbol)
//! - [`exchange`]: the exchange capability plus a paper venue
//! - [`binance`]: Binance spot REST client
//! - [`common`]: circuit breaker and rate limiter shared by clients
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use spot_grid::binance::{BinanceFactory, ClientConfig};
//! use spot_grid::exchange::Credentials;
//! use spot_grid::grid::{GridConfig, LogSink};
//! use spot_grid::session::SessionSupervisor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let supervisor = SessionSupervisor::new(Arc::new(BinanceFactory::new(ClientConfig::default())));
//!     let handle = supervisor
//!         .start(
//!             "alice",
//!             Credentials::from_env()?,
//!             "ETHUSDT",
//!             GridConfig::default(),
//!             Arc::new(LogSink::new("alice/ETHUSDT")),
//!         )
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     supervisor.stop(&handle).await?;
//!     Ok(())
//! }
//! ```

pub mod binance;
pub mod common;
pub mod config;
pub mod exchange;
pub mod grid;
pub mod session;
pub mod types;

pub use config::Config;
pub use types::*;

pub use binance::BinanceClient;
pub use exchange::{ExchangeClient, PaperExchange};
pub use grid::{GridConfig, GridController};
pub use session::{SessionHandle, SessionKey, SessionSupervisor};
