//! Session notifications
//!
//! The controller reports everything a user would want to see (price ticks,
//! fills, orders, skips, errors) as [`GridEvent`]s. Where they end up is the
//! front end's choice: the log, a chat channel, or a test collector.

use rust_decimal::Decimal;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::types::OrderId;

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    Started {
        symbol: String,
        base_price: Decimal,
        reconciled: usize,
    },
    PriceTick {
        symbol: String,
        price: Decimal,
        base_price: Decimal,
        drop_pct: Decimal,
        rise_pct: Decimal,
    },
    BuyFilled {
        order_id: OrderId,
        quantity: Decimal,
        price: Decimal,
    },
    SellPlaced {
        order_id: OrderId,
        quantity: Decimal,
        price: Decimal,
    },
    BuyPlaced {
        order_id: OrderId,
        quantity: Decimal,
        price: Decimal,
    },
    BuySkipped {
        quantity: Decimal,
        price: Decimal,
        min_notional: Decimal,
    },
    Rebased {
        from: Decimal,
        to: Decimal,
    },
    TickFailed {
        stage: &'static str,
        message: String,
    },
    Stopped {
        symbol: String,
    },
}

impl GridEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, GridEvent::TickFailed { .. })
    }
}

impl fmt::Display for GridEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridEvent::Started {
                symbol,
                base_price,
                reconciled,
            } => write!(
                f,
                "Grid started on {} at base price {} ({} open buy orders reconciled)",
                symbol, base_price, reconciled
            ),
            GridEvent::PriceTick {
                symbol,
                price,
                base_price,
                drop_pct,
                rise_pct,
            } => write!(
                f,
                "{} price {} | base {} | drop {:.4}% | rise {:.4}%",
                symbol, price, base_price, drop_pct, rise_pct
            ),
            GridEvent::BuyFilled {
                order_id,
                quantity,
                price,
            } => write!(f, "Buy order {} filled: {} @ {}", order_id, quantity, price),
            GridEvent::SellPlaced {
                order_id,
                quantity,
                price,
            } => write!(f, "Sell order {} placed: {} @ {}", order_id, quantity, price),
            GridEvent::BuyPlaced {
                order_id,
                quantity,
                price,
            } => write!(f, "Buy order {} placed: {} @ {}", order_id, quantity, price),
            GridEvent::BuySkipped {
                quantity,
                price,
                min_notional,
            } => write!(
                f,
                "Buy skipped: {} @ {} is below the minimum notional {}",
                quantity, price, min_notional
            ),
            GridEvent::Rebased { from, to } => {
                write!(f, "Base price moved up from {} to {}", from, to)
            }
            GridEvent::TickFailed { stage, message } => {
                write!(f, "Error during {}: {}", stage, message)
            }
            GridEvent::Stopped { symbol } => write!(f, "Grid stopped on {}", symbol),
        }
    }
}

/// Destination for session notifications
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &GridEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &GridEvent) {
        (**self).emit(event);
    }
}

/// Writes events to the tracing log
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    session: String,
}

impl LogSink {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &GridEvent) {
        match event {
            GridEvent::TickFailed { .. } => error!(session = %self.session, "{}", event),
            GridEvent::BuySkipped { .. } => warn!(session = %self.session, "{}", event),
            _ => info!(session = %self.session, "{}", event),
        }
    }
}

/// Forwards the rendered message to a front-end channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &GridEvent) {
        // Receiver gone means the front end detached; keep trading.
        let _ = self.tx.send(event.to_string());
    }
}

/// Sends every event to each inner sink
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &GridEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    events: Mutex<Vec<GridEvent>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GridEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<GridEvent> {
        self.events().into_iter().filter(|e| e.is_error()).collect()
    }
}

impl EventSink for CollectSink {
    fn emit(&self, event: &GridEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_messages_are_human_readable() {
        let event = GridEvent::SellPlaced {
            order_id: 12,
            quantity: dec!(10),
            price: dec!(51.5),
        };
        assert_eq!(event.to_string(), "Sell order 12 placed: 10 @ 51.5");

        let event = GridEvent::TickFailed {
            stage: "price fetch",
            message: "timeout".to_string(),
        };
        assert_eq!(event.to_string(), "Error during price fetch: timeout");
        assert!(event.is_error());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_rendered_text() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(&GridEvent::Stopped {
            symbol: "BTCUSDT".to_string(),
        });
        assert_eq!(rx.recv().await.unwrap(), "Grid stopped on BTCUSDT");
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.emit(&GridEvent::Stopped {
            symbol: "BTCUSDT".to_string(),
        });
    }

    #[test]
    fn test_fanout_reaches_all() {
        let a = Arc::new(CollectSink::new());
        let fanout = FanoutSink::new().with(a.clone()).with(a.clone());
        fanout.emit(&GridEvent::Rebased {
            from: dec!(100),
            to: dec!(101.5),
        });
        assert_eq!(a.events().len(), 2);
    }
}
