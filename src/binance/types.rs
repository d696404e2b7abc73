//! Binance spot API request and response models

use anyhow::{anyhow, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grid::filters::SymbolFilters;
use crate::types::{OpenOrder, OrderId, Side};

/// Decimal places the exchange accepts for order quantities
pub const QUANTITY_DECIMALS: u32 = 6;

/// Decimal places the exchange accepts for order prices
pub const PRICE_DECIMALS: u32 = 4;

/// Decimal places used to serialize an order's quantity and price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirePrecision {
    pub quantity: u32,
    pub price: u32,
}

impl Default for WirePrecision {
    fn default() -> Self {
        Self {
            quantity: QUANTITY_DECIMALS,
            price: PRICE_DECIMALS,
        }
    }
}

impl WirePrecision {
    /// Default precision, widened to the step and tick scale of symbols whose
    /// increments are finer, so a quantized order goes out unchanged
    pub fn for_filters(filters: &SymbolFilters) -> Self {
        Self {
            quantity: QUANTITY_DECIMALS.max(filters.step_size().normalize().scale()),
            price: PRICE_DECIMALS.max(filters.tick_size().normalize().scale()),
        }
    }
}

/// Fixed-precision wire form, truncated toward zero so it never exceeds the input
pub fn format_fixed(value: Decimal, decimals: u32) -> String {
    let truncated = value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    format!("{:.*}", decimals as usize, truncated)
}

/// Error body returned by the API, e.g. `{"code":-2013,"msg":"Order does not exist."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Non-2xx response from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub code: Option<i64>,
    pub message: String,
}

impl ApiError {
    pub const ORDER_DOES_NOT_EXIST: i64 = -2013;

    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                code: Some(parsed.code),
                message: parsed.msg,
            },
            Err(_) => Self {
                status,
                code: None,
                message: body.to_string(),
            },
        }
    }

    /// 4xx other than rate limiting / IP bans: retrying will not help
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 429 && self.status != 418
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "API error ({}, code {}): {}", self.status, code, self.message),
            None => write!(f, "API error ({}): {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// `GET /api/v3/ticker/price`
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// `GET /api/v3/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
    pub filters: Vec<RawFilter>,
}

/// One entry of a symbol's `filters` array
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum RawFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price {
        min_price: Decimal,
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { min_qty: Decimal, step_size: Decimal },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    /// Collapse the raw filter list into [`SymbolFilters`].
    ///
    /// `LOT_SIZE` and `PRICE_FILTER` are required; no notional filter means a
    /// zero minimum.
    pub fn to_filters(&self) -> Result<SymbolFilters> {
        let mut lot = None;
        let mut price = None;
        let mut min_notional = Decimal::ZERO;

        for filter in &self.filters {
            match filter {
                RawFilter::LotSize { min_qty, step_size } => lot = Some((*min_qty, *step_size)),
                RawFilter::Price {
                    min_price,
                    tick_size,
                } => price = Some((*min_price, *tick_size)),
                RawFilter::MinNotional { min_notional: n } | RawFilter::Notional { min_notional: n } => {
                    min_notional = *n
                }
                RawFilter::Other => {}
            }
        }

        let (min_qty, step_size) =
            lot.ok_or_else(|| anyhow!("{} has no LOT_SIZE filter", self.symbol))?;
        let (min_price, tick_size) =
            price.ok_or_else(|| anyhow!("{} has no PRICE_FILTER filter", self.symbol))?;

        SymbolFilters::new(
            min_qty.normalize(),
            step_size.normalize(),
            min_price.normalize(),
            tick_size.normalize(),
            min_notional.normalize(),
        )
        .map_err(|e| anyhow!("{}: {}", self.symbol, e))
    }
}

/// Order as returned by `GET /api/v3/openOrders` and `GET /api/v3/order`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub symbol: String,
    pub order_id: OrderId,
    pub price: Decimal,
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    pub status: String,
    pub side: Side,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
}

impl From<OrderInfo> for OpenOrder {
    fn from(info: OrderInfo) -> Self {
        OpenOrder {
            order_id: info.order_id,
            side: info.side,
            price: info.price,
            quantity: info.orig_qty,
        }
    }
}

/// Response of `POST /api/v3/order`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderResponse {
    pub symbol: String,
    pub order_id: OrderId,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "symbols": [{
            "symbol": "ETHUSDT",
            "status": "TRADING",
            "baseAsset": "ETH",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "1000000.00000000", "tickSize": "0.01000000"},
                {"filterType": "LOT_SIZE", "minQty": "0.00010000", "maxQty": "9000.00000000", "stepSize": "0.00010000"},
                {"filterType": "ICEBERG_PARTS", "limit": 10},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true, "maxNotional": "9000000.00000000", "applyMaxToMarket": false, "avgPriceMins": 5}
            ]
        }]
    }"#;

    #[test]
    fn test_parse_exchange_info_filters() {
        let info: ExchangeInfo = serde_json::from_str(EXCHANGE_INFO).unwrap();
        let filters = info.symbols[0].to_filters().unwrap();

        assert_eq!(filters.tick_size(), dec!(0.01));
        assert_eq!(filters.min_price(), dec!(0.01));
        assert_eq!(filters.step_size(), dec!(0.0001));
        assert_eq!(filters.min_qty(), dec!(0.0001));
        assert_eq!(filters.min_notional(), dec!(5));
    }

    #[test]
    fn test_missing_lot_size_is_error() {
        let info = SymbolInfo {
            symbol: "XUSDT".to_string(),
            status: None,
            filters: vec![RawFilter::Price {
                min_price: dec!(0.01),
                tick_size: dec!(0.01),
            }],
        };
        assert!(info.to_filters().is_err());
    }

    #[test]
    fn test_missing_notional_defaults_to_zero() {
        let info = SymbolInfo {
            symbol: "XUSDT".to_string(),
            status: None,
            filters: vec![
                RawFilter::Price {
                    min_price: dec!(0.01),
                    tick_size: dec!(0.01),
                },
                RawFilter::LotSize {
                    min_qty: dec!(1),
                    step_size: dec!(1),
                },
            ],
        };
        assert_eq!(info.to_filters().unwrap().min_notional(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_open_order() {
        let body = r#"[{"symbol":"ETHUSDT","orderId":28,"clientOrderId":"abc","price":"2450.12000000",
            "origQty":"0.00610000","executedQty":"0.00000000","status":"NEW","timeInForce":"GTC",
            "type":"LIMIT","side":"BUY","time":1499827319559}]"#;
        let orders: Vec<OrderInfo> = serde_json::from_str(body).unwrap();
        let open: OpenOrder = orders[0].clone().into();
        assert_eq!(open.order_id, 28);
        assert_eq!(open.side, Side::Buy);
        assert_eq!(open.price, dec!(2450.12));
        assert_eq!(open.quantity, dec!(0.0061));
    }

    #[test]
    fn test_format_fixed_truncates() {
        assert_eq!(format_fixed(dec!(0.2014099), QUANTITY_DECIMALS), "0.201409");
        assert_eq!(format_fixed(dec!(98.30799), PRICE_DECIMALS), "98.3079");
        assert_eq!(format_fixed(dec!(51.5), PRICE_DECIMALS), "51.5000");
        assert_eq!(format_fixed(dec!(10), QUANTITY_DECIMALS), "10.000000");
    }

    #[test]
    fn test_wire_precision_follows_fine_ticks() {
        let coarse =
            SymbolFilters::new(dec!(0.001), dec!(0.001), dec!(0.01), dec!(0.01), dec!(5)).unwrap();
        assert_eq!(WirePrecision::for_filters(&coarse), WirePrecision::default());

        let fine = SymbolFilters::new(
            dec!(1),
            dec!(1),
            dec!(0.00000001),
            dec!(0.00000001),
            dec!(5),
        )
        .unwrap();
        let precision = WirePrecision::for_filters(&fine);
        assert_eq!(precision.price, 8);
        assert_eq!(precision.quantity, QUANTITY_DECIMALS);
        assert_eq!(format_fixed(dec!(0.00001234), precision.price), "0.00001234");
        assert_eq!(format_fixed(dec!(0.00001234), PRICE_DECIMALS), "0.0000");
    }

    #[test]
    fn test_api_error_parsing() {
        let err = ApiError::from_response(400, r#"{"code":-2013,"msg":"Order does not exist."}"#);
        assert_eq!(err.code, Some(ApiError::ORDER_DOES_NOT_EXIST));
        assert!(err.is_client_error());

        let err = ApiError::from_response(502, "Bad Gateway");
        assert_eq!(err.code, None);
        assert!(!err.is_client_error());
        assert!(!ApiError::from_response(429, "{}").is_client_error());
    }
}
