//! Core data types shared by the exchange clients and the grid engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-assigned order identifier
pub type OrderId = u64;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the exchange
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    /// Any status string this crate does not know about
    Other(String),
}

impl OrderStatus {
    /// Parse the exchange's status string (e.g. "PARTIALLY_FILLED")
    pub fn from_wire(s: &str) -> Self {
        match s {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "CANCELLED" => OrderStatus::Canceled,
            "PENDING_CANCEL" => OrderStatus::PendingCancel,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => f.write_str("NEW"),
            OrderStatus::PartiallyFilled => f.write_str("PARTIALLY_FILLED"),
            OrderStatus::Filled => f.write_str("FILLED"),
            OrderStatus::Canceled => f.write_str("CANCELED"),
            OrderStatus::PendingCancel => f.write_str("PENDING_CANCEL"),
            OrderStatus::Rejected => f.write_str("REJECTED"),
            OrderStatus::Expired => f.write_str("EXPIRED"),
            OrderStatus::Other(s) => f.write_str(s),
        }
    }
}

/// An order currently resting on the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Acknowledgement returned when the exchange accepts an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(OrderStatus::from_wire("NEW"), OrderStatus::New);
        assert_eq!(OrderStatus::from_wire("FILLED"), OrderStatus::Filled);
        assert_eq!(
            OrderStatus::from_wire("PARTIALLY_FILLED"),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(
            OrderStatus::from_wire("SOMETHING_ELSE"),
            OrderStatus::Other("SOMETHING_ELSE".to_string())
        );
    }

    #[test]
    fn test_only_filled_is_filled() {
        assert!(OrderStatus::Filled.is_filled());
        assert!(!OrderStatus::PartiallyFilled.is_filled());
        assert!(!OrderStatus::New.is_filled());
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }
}
