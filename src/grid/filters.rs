//! Exchange filter normalization
//!
//! Quantization always rounds *down* to the allowed increment and then clamps
//! up to the exchange minimum. Rounding down keeps the computed notional at or
//! below what was requested; rounding up would overstate it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("step size must be > 0 (got {0})")]
    NonPositiveStep(Decimal),

    #[error("tick size must be > 0 (got {0})")]
    NonPositiveTick(Decimal),

    #[error("{name} must be >= 0 (got {value})")]
    NegativeMinimum { name: &'static str, value: Decimal },
}

/// Per-symbol trading constraints, fetched once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    min_qty: Decimal,
    step_size: Decimal,
    min_price: Decimal,
    tick_size: Decimal,
    min_notional: Decimal,
}

impl SymbolFilters {
    pub fn new(
        min_qty: Decimal,
        step_size: Decimal,
        min_price: Decimal,
        tick_size: Decimal,
        min_notional: Decimal,
    ) -> Result<Self, FilterError> {
        if step_size <= Decimal::ZERO {
            return Err(FilterError::NonPositiveStep(step_size));
        }
        if tick_size <= Decimal::ZERO {
            return Err(FilterError::NonPositiveTick(tick_size));
        }
        for (name, value) in [
            ("min_qty", min_qty),
            ("min_price", min_price),
            ("min_notional", min_notional),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(FilterError::NegativeMinimum { name, value });
            }
        }

        Ok(Self {
            min_qty,
            step_size,
            min_price,
            tick_size,
            min_notional,
        })
    }

    pub fn min_qty(&self) -> Decimal {
        self.min_qty
    }

    pub fn step_size(&self) -> Decimal {
        self.step_size
    }

    pub fn min_price(&self) -> Decimal {
        self.min_price
    }

    pub fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    pub fn min_notional(&self) -> Decimal {
        self.min_notional
    }

    /// Quantize a raw quantity against this symbol's lot size
    pub fn quantity(&self, raw: Decimal) -> Decimal {
        quantize_quantity(raw, self.step_size, self.min_qty)
    }

    /// Quantize a raw price against this symbol's tick size
    pub fn price(&self, raw: Decimal) -> Decimal {
        quantize_price(raw, self.tick_size, self.min_price)
    }

    pub fn notional_ok(&self, qty: Decimal, price: Decimal) -> bool {
        meets_notional(qty, price, self.min_notional)
    }
}

fn floor_to_increment(raw: Decimal, increment: Decimal) -> Decimal {
    (raw / increment).floor() * increment
}

/// `floor(raw / step_size) * step_size`, clamped to at least `min_qty`
pub fn quantize_quantity(raw: Decimal, step_size: Decimal, min_qty: Decimal) -> Decimal {
    floor_to_increment(raw, step_size).max(min_qty)
}

/// `floor(raw / tick_size) * tick_size`, clamped to at least `min_price`
pub fn quantize_price(raw: Decimal, tick_size: Decimal, min_price: Decimal) -> Decimal {
    floor_to_increment(raw, tick_size).max(min_price)
}

/// True iff `qty * price >= min_notional`
pub fn meets_notional(qty: Decimal, price: Decimal, min_notional: Decimal) -> bool {
    qty * price >= min_notional
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_filters() -> SymbolFilters {
        SymbolFilters::new(dec!(0.00001), dec!(0.00001), dec!(0.01), dec!(0.01), dec!(5)).unwrap()
    }

    #[test]
    fn test_quantity_rounds_down() {
        assert_eq!(quantize_quantity(dec!(1.23456789), dec!(0.001), dec!(0.001)), dec!(1.234));
        assert_eq!(quantize_quantity(dec!(1.2399), dec!(0.01), dec!(0.01)), dec!(1.23));
    }

    #[test]
    fn test_quantity_clamped_to_minimum() {
        assert_eq!(quantize_quantity(dec!(0.0004), dec!(0.001), dec!(0.01)), dec!(0.01));
        assert_eq!(quantize_quantity(dec!(0), dec!(0.001), dec!(0.5)), dec!(0.5));
    }

    #[test]
    fn test_price_rounds_down_to_tick() {
        assert_eq!(quantize_price(dec!(98.30799), dec!(0.0001), dec!(0.0001)), dec!(98.3079));
        assert_eq!(quantize_price(dec!(51.5), dec!(0.0001), dec!(0.0001)), dec!(51.5));
    }

    #[test]
    fn test_price_clamped_to_minimum() {
        assert_eq!(quantize_price(dec!(0.00001), dec!(0.01), dec!(0.01)), dec!(0.01));
    }

    #[test]
    fn test_quantization_is_idempotent() {
        let cases = [
            (dec!(1.23456789), dec!(0.001), dec!(0.001)),
            (dec!(0.0004), dec!(0.001), dec!(0.01)),
            (dec!(123456.789), dec!(0.5), dec!(1)),
            (dec!(0.015), dec!(0.01), dec!(0.015)),
        ];
        for (raw, step, min) in cases {
            let once = quantize_quantity(raw, step, min);
            assert_eq!(quantize_quantity(once, step, min), once, "raw={}", raw);
            let once = quantize_price(raw, step, min);
            assert_eq!(quantize_price(once, step, min), once, "raw={}", raw);
        }
    }

    #[test]
    fn test_quantity_is_multiple_of_step_above_min() {
        let step = dec!(0.25);
        let min = dec!(0.1);
        for raw in [dec!(0.3), dec!(1.1), dec!(7.99), dec!(100.01)] {
            let q = quantize_quantity(raw, step, min);
            assert!(q >= min);
            assert!(q <= raw);
            assert_eq!(q % step, Decimal::ZERO, "q={}", q);
        }
    }

    #[test]
    fn test_notional_boundary_is_inclusive() {
        assert!(meets_notional(dec!(2), dec!(5), dec!(10)));
        assert!(meets_notional(dec!(2), dec!(5.01), dec!(10)));
        assert!(!meets_notional(dec!(2), dec!(4.99), dec!(10)));
    }

    #[test]
    fn test_symbol_filters_helpers() {
        let f = btc_filters();
        assert_eq!(f.quantity(dec!(0.000159)), dec!(0.00015));
        assert_eq!(f.price(dec!(62000.129)), dec!(62000.12));
        assert!(f.notional_ok(dec!(0.0001), dec!(50000)));
        assert!(!f.notional_ok(dec!(0.00001), dec!(50000)));
    }

    #[test]
    fn test_rejects_non_positive_increments() {
        assert_eq!(
            SymbolFilters::new(dec!(0), dec!(0), dec!(0), dec!(0.01), dec!(0)),
            Err(FilterError::NonPositiveStep(dec!(0)))
        );
        assert_eq!(
            SymbolFilters::new(dec!(0), dec!(0.1), dec!(0), dec!(-1), dec!(0)),
            Err(FilterError::NonPositiveTick(dec!(-1)))
        );
        assert!(SymbolFilters::new(dec!(-1), dec!(0.1), dec!(0), dec!(0.1), dec!(0)).is_err());
    }
}
