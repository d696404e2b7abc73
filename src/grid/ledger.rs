//! In-memory ledger of buy orders awaiting fill

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::OrderId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("order {0} is already tracked")]
    DuplicateOrder(OrderId),
}

/// One outstanding buy order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub order_id: OrderId,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl TrackedOrder {
    pub fn new(order_id: OrderId, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_id,
            quantity,
            price,
        }
    }
}

/// Insertion-ordered set of tracked orders, unique by order id
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    orders: Vec<TrackedOrder>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, order: TrackedOrder) -> Result<(), LedgerError> {
        if self.contains(order.order_id) {
            return Err(LedgerError::DuplicateOrder(order.order_id));
        }
        self.orders.push(order);
        Ok(())
    }

    /// Remove by identity, returning the order if it was tracked
    pub fn remove(&mut self, order_id: OrderId) -> Option<TrackedOrder> {
        let idx = self.orders.iter().position(|o| o.order_id == order_id)?;
        Some(self.orders.remove(idx))
    }

    /// Owned copy of the current sequence.
    ///
    /// Iterate this, not the ledger, when entries may be removed mid-scan.
    pub fn snapshot(&self) -> Vec<TrackedOrder> {
        self.orders.clone()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.iter().any(|o| o.order_id == order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Total quote value committed to resting buys
    pub fn committed_notional(&self) -> Decimal {
        self.orders.iter().map(|o| o.quantity * o.price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: OrderId) -> TrackedOrder {
        TrackedOrder::new(id, dec!(1), dec!(10))
    }

    #[test]
    fn test_add_and_snapshot_keep_order() {
        let mut ledger = OrderLedger::new();
        ledger.add(order(3)).unwrap();
        ledger.add(order(1)).unwrap();
        ledger.add(order(2)).unwrap();

        let ids: Vec<_> = ledger.snapshot().iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut ledger = OrderLedger::new();
        ledger.add(order(7)).unwrap();
        assert_eq!(ledger.add(order(7)), Err(LedgerError::DuplicateOrder(7)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_remove_by_id() {
        let mut ledger = OrderLedger::new();
        ledger.add(order(1)).unwrap();
        ledger.add(order(2)).unwrap();

        assert_eq!(ledger.remove(1).map(|o| o.order_id), Some(1));
        assert!(ledger.remove(1).is_none());
        assert!(!ledger.contains(1));
        assert!(ledger.contains(2));
    }

    #[test]
    fn test_removal_while_scanning_snapshot() {
        let mut ledger = OrderLedger::new();
        for id in 1..=6 {
            ledger.add(order(id)).unwrap();
        }

        let mut visited = Vec::new();
        for o in ledger.snapshot() {
            visited.push(o.order_id);
            if o.order_id % 2 == 0 {
                ledger.remove(o.order_id);
            }
        }

        assert_eq!(visited, vec![1, 2, 3, 4, 5, 6]);
        let left: Vec<_> = ledger.snapshot().iter().map(|o| o.order_id).collect();
        assert_eq!(left, vec![1, 3, 5]);
    }

    #[test]
    fn test_committed_notional() {
        let mut ledger = OrderLedger::new();
        ledger.add(TrackedOrder::new(1, dec!(2), dec!(10))).unwrap();
        ledger.add(TrackedOrder::new(2, dec!(0.5), dec!(4))).unwrap();
        assert_eq!(ledger.committed_notional(), dec!(22));
    }
}
