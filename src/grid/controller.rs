//! Grid controller
//!
//! One floating reference price (`base_price`) per session:
//! - a drop of `percentage_drop` percent below it opens a discounted buy and
//!   moves the reference down to the current price;
//! - a rise of `percentage_rise` percent above it only moves the reference up;
//! - every filled buy is answered with a sell at `target_profit_ratio` above
//!   its limit price.
//!
//! This is a single-level grid. There is no ladder of fixed levels.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{ConfigError, GridConfig};
use super::events::{EventSink, GridEvent};
use super::filters::SymbolFilters;
use super::ledger::{OrderLedger, TrackedOrder};
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::types::{OrderId, Side};

#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid grid config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start grid on {symbol}: could not fetch {stage}: {source}")]
    Startup {
        symbol: String,
        stage: &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("tick failed during {stage}: {source}")]
    Tick {
        stage: &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("grid on {0} is not running")]
    NotRunning(String),
}

impl GridError {
    pub fn is_startup(&self) -> bool {
        matches!(self, GridError::Startup { .. } | GridError::Config(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Initializing,
    Running,
    Stopped,
}

/// What the entry decision did on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Bought,
    BuySkipped,
    BuyFailed,
    Rebased,
    Hold,
}

/// An order accepted by the exchange during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Outcome of one polling tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub price: Decimal,
    pub drop_pct: Decimal,
    pub rise_pct: Decimal,
    /// Buy orders observed filled and answered with a sell
    pub filled: Vec<OrderId>,
    pub sells: Vec<PlacedOrder>,
    pub buy: Option<PlacedOrder>,
    pub action: TickAction,
    /// Recovered failures, one message per failing step
    pub errors: Vec<String>,
    /// Quote value still resting in tracked buys after the tick
    pub committed: Decimal,
}

impl TickReport {
    fn new(price: Decimal, drop_pct: Decimal, rise_pct: Decimal) -> Self {
        Self {
            price,
            drop_pct,
            rise_pct,
            filled: Vec::new(),
            sells: Vec::new(),
            buy: None,
            action: TickAction::Hold,
            errors: Vec::new(),
            committed: Decimal::ZERO,
        }
    }
}

/// Percentage moves of `price` relative to `base`: `(drop, rise)`
pub fn price_moves(base: Decimal, price: Decimal) -> (Decimal, Decimal) {
    let drop_pct = (base - price) / base * dec!(100);
    let rise_pct = (price - base) / base * dec!(100);
    (drop_pct, rise_pct)
}

pub struct GridController {
    symbol: String,
    config: GridConfig,
    exchange: Arc<dyn ExchangeClient>,
    sink: Arc<dyn EventSink>,
    filters: SymbolFilters,
    ledger: OrderLedger,
    base_price: Decimal,
    state: GridState,
    ticks: u64,
}

impl GridController {
    /// Fetch filters, reconcile open buys, and set the base price.
    ///
    /// The controller is only returned once all three succeeded; it is then
    /// `Running`.
    pub async fn start(
        symbol: impl Into<String>,
        config: GridConfig,
        exchange: Arc<dyn ExchangeClient>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, GridError> {
        let symbol = symbol.into();
        config.validate()?;

        let startup_err = |stage: &'static str| {
            let symbol = symbol.clone();
            move |source: ExchangeError| GridError::Startup {
                symbol,
                stage,
                source,
            }
        };

        let filters = exchange
            .get_symbol_filters(&symbol)
            .await
            .map_err(startup_err("symbol filters"))?;
        debug!(
            symbol = %symbol,
            step = %filters.step_size(),
            tick = %filters.tick_size(),
            min_notional = %filters.min_notional(),
            "Symbol filters loaded"
        );

        let open_orders = exchange
            .get_open_orders(&symbol)
            .await
            .map_err(startup_err("open orders"))?;
        let mut ledger = OrderLedger::new();
        for order in open_orders.into_iter().filter(|o| o.side == Side::Buy) {
            let tracked = TrackedOrder::new(order.order_id, order.quantity, order.price);
            if let Err(e) = ledger.add(tracked) {
                warn!(symbol = %symbol, "Skipping open order during reconciliation: {}", e);
            }
        }

        let base_price = exchange
            .get_price(&symbol)
            .await
            .map_err(startup_err("price"))?;
        if base_price <= Decimal::ZERO {
            return Err(startup_err("price")(ExchangeError::InvalidResponse(format!(
                "non-positive price {}",
                base_price
            ))));
        }

        info!(
            symbol = %symbol,
            base_price = %base_price,
            reconciled = ledger.len(),
            "Grid controller running"
        );
        sink.emit(&GridEvent::Started {
            symbol: symbol.clone(),
            base_price,
            reconciled: ledger.len(),
        });

        Ok(Self {
            symbol,
            config,
            exchange,
            sink,
            filters,
            ledger,
            base_price,
            state: GridState::Running,
            ticks: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn filters(&self) -> &SymbolFilters {
        &self.filters
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn base_price(&self) -> Decimal {
        self.base_price
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stop(&mut self) {
        if self.state == GridState::Stopped {
            return;
        }
        self.state = GridState::Stopped;
        info!(symbol = %self.symbol, tracked = self.ledger.len(), "Grid controller stopped");
        self.sink.emit(&GridEvent::Stopped {
            symbol: self.symbol.clone(),
        });
    }

    fn report_failure(&self, stage: &'static str, err: &ExchangeError, report: Option<&mut TickReport>) {
        let message = err.to_string();
        warn!(symbol = %self.symbol, stage, "Tick step failed: {}", message);
        self.sink.emit(&GridEvent::TickFailed {
            stage,
            message: message.clone(),
        });
        if let Some(report) = report {
            report.errors.push(format!("{}: {}", stage, message));
        }
    }

    /// Run one polling tick.
    ///
    /// A failed price fetch aborts the tick with `GridError::Tick`. Later
    /// failures are recovered inside the tick and listed in the report.
    pub async fn tick(&mut self) -> Result<TickReport, GridError> {
        if self.state != GridState::Running {
            return Err(GridError::NotRunning(self.symbol.clone()));
        }
        self.ticks += 1;

        let price = match self.exchange.get_price(&self.symbol).await {
            Ok(p) if p > Decimal::ZERO => p,
            Ok(p) => {
                let err = ExchangeError::InvalidResponse(format!("non-positive price {}", p));
                self.report_failure("price fetch", &err, None);
                return Err(GridError::Tick {
                    stage: "price fetch",
                    source: err,
                });
            }
            Err(err) => {
                self.report_failure("price fetch", &err, None);
                return Err(GridError::Tick {
                    stage: "price fetch",
                    source: err,
                });
            }
        };

        let (drop_pct, rise_pct) = price_moves(self.base_price, price);
        self.sink.emit(&GridEvent::PriceTick {
            symbol: self.symbol.clone(),
            price,
            base_price: self.base_price,
            drop_pct,
            rise_pct,
        });

        let mut report = TickReport::new(price, drop_pct, rise_pct);
        self.sweep_fills(&mut report).await;
        self.decide_entry(&mut report).await;
        report.committed = self.ledger.committed_notional();

        debug!(
            symbol = %self.symbol,
            tick = self.ticks,
            price = %price,
            base = %self.base_price,
            action = ?report.action,
            tracked = self.ledger.len(),
            committed = %report.committed,
            "Tick complete"
        );
        Ok(report)
    }

    /// Answer every filled buy with a take-profit sell.
    ///
    /// A buy leaves the ledger only after its sell was accepted, so a failed
    /// status check or sell placement is retried on the next tick.
    async fn sweep_fills(&mut self, report: &mut TickReport) {
        for order in self.ledger.snapshot() {
            let status = match self
                .exchange
                .get_order_status(&self.symbol, order.order_id)
                .await
            {
                Ok(status) => status,
                Err(err) => {
                    self.report_failure("order status check", &err, Some(&mut *report));
                    continue;
                }
            };
            if !status.is_filled() {
                continue;
            }

            self.sink.emit(&GridEvent::BuyFilled {
                order_id: order.order_id,
                quantity: order.quantity,
                price: order.price,
            });

            let sell_price = self
                .filters
                .price(order.price * (Decimal::ONE + self.config.target_profit_ratio));
            match self
                .exchange
                .place_limit_order(&self.symbol, Side::Sell, order.quantity, sell_price)
                .await
            {
                Ok(ack) => {
                    self.ledger.remove(order.order_id);
                    report.filled.push(order.order_id);
                    report.sells.push(PlacedOrder {
                        order_id: ack.order_id,
                        side: Side::Sell,
                        quantity: order.quantity,
                        price: sell_price,
                    });
                    self.sink.emit(&GridEvent::SellPlaced {
                        order_id: ack.order_id,
                        quantity: order.quantity,
                        price: sell_price,
                    });
                }
                Err(err) => self.report_failure("sell placement", &err, Some(&mut *report)),
            }
        }
    }

    /// Buy on a qualifying drop, otherwise re-center on a qualifying rise
    async fn decide_entry(&mut self, report: &mut TickReport) {
        let price = report.price;

        if self.config.buys_enabled() && report.drop_pct >= self.config.percentage_drop {
            let quantity = self.filters.quantity(self.config.investment_amount / price);
            let buy_price = self
                .filters
                .price(price * (Decimal::ONE - self.config.entry_discount));

            if !self.filters.notional_ok(quantity, buy_price) {
                report.action = TickAction::BuySkipped;
                self.sink.emit(&GridEvent::BuySkipped {
                    quantity,
                    price: buy_price,
                    min_notional: self.filters.min_notional(),
                });
                return;
            }

            match self
                .exchange
                .place_limit_order(&self.symbol, Side::Buy, quantity, buy_price)
                .await
            {
                Ok(ack) => {
                    if let Err(e) = self
                        .ledger
                        .add(TrackedOrder::new(ack.order_id, quantity, buy_price))
                    {
                        warn!(symbol = %self.symbol, "Accepted buy not tracked: {}", e);
                        report.errors.push(e.to_string());
                    }
                    self.base_price = price;
                    report.action = TickAction::Bought;
                    report.buy = Some(PlacedOrder {
                        order_id: ack.order_id,
                        side: Side::Buy,
                        quantity,
                        price: buy_price,
                    });
                    self.sink.emit(&GridEvent::BuyPlaced {
                        order_id: ack.order_id,
                        quantity,
                        price: buy_price,
                    });
                }
                Err(err) => {
                    report.action = TickAction::BuyFailed;
                    self.report_failure("buy placement", &err, Some(&mut *report));
                }
            }
        } else if report.rise_pct >= self.config.percentage_rise {
            let from = self.base_price;
            self.base_price = price;
            report.action = TickAction::Rebased;
            self.sink.emit(&GridEvent::Rebased { from, to: price });
        }
    }
}
