//! Percentage grid engine
//!
//! - [`filters`]: quantization against exchange lot/tick/notional rules
//! - [`ledger`]: buy orders awaiting fill
//! - [`controller`]: the polling state machine
//! - [`events`]: notifications for the front end
//! - [`config`]: per-session grid parameters

pub mod config;
pub mod controller;
pub mod events;
pub mod filters;
pub mod ledger;

pub use config::{ConfigError, GridConfig};
pub use controller::{
    price_moves, GridController, GridError, GridState, PlacedOrder, TickAction, TickReport,
};
pub use events::{ChannelSink, CollectSink, EventSink, FanoutSink, GridEvent, LogSink};
pub use filters::{meets_notional, quantize_price, quantize_quantity, FilterError, SymbolFilters};
pub use ledger::{LedgerError, OrderLedger, TrackedOrder};
