//! Paper exchange
//!
//! In-memory simulated venue. Orders rest on a per-symbol book and fill when a
//! price fetch crosses them: a BUY fills once the price is at or below its
//! limit, a SELL once the price is at or above its limit. Prices and filters
//! either come from a wrapped market-data client or are set by the caller.
//!
//! Every order belongs to an owner (the API key it was placed with). A
//! [`PaperAccount`] only sees its owner's orders, so several users can trade
//! the same symbol on one venue without picking up each other's orders.
//! `PaperExchange` used directly acts as an unowned account that sees the
//! whole book.
//!
//! Failures can be injected per operation, which is how the tests exercise the
//! grid's tick-level error handling.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{ClientFactory, Credentials, ExchangeClient, ExchangeError, ExchangeResult};
use crate::grid::filters::SymbolFilters;
use crate::types::{OpenOrder, OrderAck, OrderId, OrderStatus, Side};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperOp {
    Price,
    Filters,
    OpenOrders,
    OrderStatus,
    PlaceOrder,
}

/// An order on the paper book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperOrder {
    pub order_id: OrderId,
    /// API key of the account that placed it; `None` for unowned orders
    pub owner: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Default)]
struct PaperBook {
    prices: HashMap<String, Decimal>,
    filters: HashMap<String, SymbolFilters>,
    orders: BTreeMap<OrderId, PaperOrder>,
    failures: HashMap<PaperOp, VecDeque<String>>,
    next_order_id: OrderId,
}

impl PaperBook {
    fn take_failure(&mut self, op: PaperOp) -> ExchangeResult<()> {
        match self.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(reason) => Err(ExchangeError::Simulated(reason)),
            None => Ok(()),
        }
    }

    fn insert(
        &mut self,
        owner: Option<&str>,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> OrderId {
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        self.orders.insert(
            order_id,
            PaperOrder {
                order_id,
                owner: owner.map(str::to_string),
                symbol: symbol.to_string(),
                side,
                quantity,
                price,
                status: OrderStatus::New,
            },
        );
        order_id
    }

    fn cross(&mut self, symbol: &str, price: Decimal) {
        for order in self.orders.values_mut() {
            if order.symbol != symbol || order.status != OrderStatus::New {
                continue;
            }
            let crossed = match order.side {
                Side::Buy => price <= order.price,
                Side::Sell => price >= order.price,
            };
            if crossed {
                info!(
                    order_id = order.order_id,
                    side = %order.side,
                    qty = %order.quantity,
                    limit = %order.price,
                    market = %price,
                    "[PAPER] order filled"
                );
                order.status = OrderStatus::Filled;
            }
        }
    }
}

/// Simulated exchange implementing [`ExchangeClient`]
pub struct PaperExchange {
    book: Mutex<PaperBook>,
    market: Option<Arc<dyn ExchangeClient>>,
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            book: Mutex::new(PaperBook {
                next_order_id: 1,
                ..PaperBook::default()
            }),
            market: None,
        }
    }

    /// Pull prices and filters from a real market-data client
    pub fn with_market(market: Arc<dyn ExchangeClient>) -> Self {
        Self {
            market: Some(market),
            ..Self::new()
        }
    }

    fn book(&self) -> MutexGuard<'_, PaperBook> {
        // A poisoned lock only means a panicking test thread; the book is still usable.
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.book().prices.insert(symbol.to_string(), price);
    }

    pub fn set_filters(&self, symbol: &str, filters: SymbolFilters) {
        self.book().filters.insert(symbol.to_string(), filters);
    }

    /// Make the next `op` call fail with `reason`. Calls queue up.
    pub fn fail_next(&self, op: PaperOp, reason: impl Into<String>) {
        self.book()
            .failures
            .entry(op)
            .or_default()
            .push_back(reason.into());
    }

    /// Put an unowned resting order on the book, as if placed by an earlier run
    pub fn seed_order(&self, symbol: &str, side: Side, quantity: Decimal, price: Decimal) -> OrderId {
        self.book().insert(None, symbol, side, quantity, price)
    }

    /// Put a resting order on the book for the account with `api_key`
    pub fn seed_order_for(
        &self,
        api_key: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> OrderId {
        self.book().insert(Some(api_key), symbol, side, quantity, price)
    }

    /// Force an order's status (fill, cancel, ...)
    pub fn set_status(&self, order_id: OrderId, status: OrderStatus) -> bool {
        match self.book().orders.get_mut(&order_id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    pub fn fill(&self, order_id: OrderId) -> bool {
        self.set_status(order_id, OrderStatus::Filled)
    }

    pub fn order(&self, order_id: OrderId) -> Option<PaperOrder> {
        self.book().orders.get(&order_id).cloned()
    }

    /// Every order ever placed for `symbol`, oldest first
    pub fn orders(&self, symbol: &str) -> Vec<PaperOrder> {
        self.book()
            .orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn orders_by_side(&self, symbol: &str, side: Side) -> Vec<PaperOrder> {
        self.orders(symbol)
            .into_iter()
            .filter(|o| o.side == side)
            .collect()
    }
}

impl PaperOrder {
    /// Unowned views see every order, owned views only their own
    fn visible_to(&self, owner: Option<&str>) -> bool {
        owner.is_none() || self.owner.as_deref() == owner
    }
}

impl PaperExchange {
    async fn price_for(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.book().take_failure(PaperOp::Price)?;

        let last = self.book().prices.get(symbol).copied();
        let price = match &self.market {
            Some(market) => market.get_price(symbol).await?,
            None => last.ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?,
        };

        let mut book = self.book();
        book.prices.insert(symbol.to_string(), price);
        book.cross(symbol, price);
        Ok(price)
    }

    async fn filters_for(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.book().take_failure(PaperOp::Filters)?;

        let cached = self.book().filters.get(symbol).copied();
        if let Some(filters) = cached {
            return Ok(filters);
        }
        match &self.market {
            Some(market) => {
                let filters = market.get_symbol_filters(symbol).await?;
                self.book().filters.insert(symbol.to_string(), filters);
                Ok(filters)
            }
            None => Err(ExchangeError::SymbolNotFound(symbol.to_string())),
        }
    }

    fn open_orders_for(&self, owner: Option<&str>, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let mut book = self.book();
        book.take_failure(PaperOp::OpenOrders)?;

        Ok(book
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::New && o.visible_to(owner))
            .map(|o| OpenOrder {
                order_id: o.order_id,
                side: o.side,
                price: o.price,
                quantity: o.quantity,
            })
            .collect())
    }

    fn status_for(
        &self,
        owner: Option<&str>,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderStatus> {
        let mut book = self.book();
        book.take_failure(PaperOp::OrderStatus)?;

        book.orders
            .get(&order_id)
            .filter(|o| o.symbol == symbol && o.visible_to(owner))
            .map(|o| o.status.clone())
            .ok_or(ExchangeError::OrderNotFound(order_id))
    }

    fn place_for(
        &self,
        owner: Option<&str>,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let mut book = self.book();
        book.take_failure(PaperOp::PlaceOrder)?;

        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(ExchangeError::Request(format!(
                "invalid order: qty={} price={}",
                quantity, price
            )));
        }
        if let Some(filters) = book.filters.get(symbol) {
            if !filters.notional_ok(quantity, price) {
                return Err(ExchangeError::Request(format!(
                    "Filter failure: NOTIONAL ({} x {} < {})",
                    quantity,
                    price,
                    filters.min_notional()
                )));
            }
        }

        let order_id = book.insert(owner, symbol, side, quantity, price);
        debug!(order_id, owner = owner.unwrap_or("-"), %side, %quantity, %price, symbol, "[PAPER] order accepted");

        Ok(OrderAck { order_id })
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.price_for(symbol).await
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.filters_for(symbol).await
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        self.open_orders_for(None, symbol)
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderStatus> {
        self.status_for(None, symbol, order_id)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        self.place_for(None, symbol, side, quantity, price)
    }
}

/// One user's view of a shared [`PaperExchange`]
#[derive(Clone)]
pub struct PaperAccount {
    venue: Arc<PaperExchange>,
    owner: String,
}

impl PaperAccount {
    pub fn new(venue: Arc<PaperExchange>, api_key: impl Into<String>) -> Self {
        Self {
            venue,
            owner: api_key.into(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperAccount {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.venue.price_for(symbol).await
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.venue.filters_for(symbol).await
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        self.venue.open_orders_for(Some(&self.owner), symbol)
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: OrderId,
    ) -> ExchangeResult<OrderStatus> {
        self.venue.status_for(Some(&self.owner), symbol, order_id)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        self.venue
            .place_for(Some(&self.owner), symbol, side, quantity, price)
    }
}

/// Hands every session its own account on one simulated venue
#[derive(Clone)]
pub struct PaperFactory {
    exchange: Arc<PaperExchange>,
}

impl PaperFactory {
    pub fn new(exchange: Arc<PaperExchange>) -> Self {
        Self { exchange }
    }

    pub fn exchange(&self) -> &Arc<PaperExchange> {
        &self.exchange
    }
}

impl ClientFactory for PaperFactory {
    fn connect(&self, credentials: &Credentials) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        debug!(api_key = credentials.api_key(), "[PAPER] session connected");
        Ok(Arc::new(PaperAccount::new(
            self.exchange.clone(),
            credentials.api_key(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SYM: &str = "ETHUSDT";

    #[tokio::test]
    async fn test_price_fetch_fills_crossed_orders() {
        let ex = PaperExchange::new();
        ex.set_price(SYM, dec!(100));
        let buy = ex.place_limit_order(SYM, Side::Buy, dec!(1), dec!(99)).await.unwrap();
        let sell = ex.place_limit_order(SYM, Side::Sell, dec!(1), dec!(101)).await.unwrap();

        ex.set_price(SYM, dec!(99));
        ex.get_price(SYM).await.unwrap();
        assert_eq!(ex.get_order_status(SYM, buy.order_id).await.unwrap(), OrderStatus::Filled);
        assert_eq!(ex.get_order_status(SYM, sell.order_id).await.unwrap(), OrderStatus::New);

        ex.set_price(SYM, dec!(101.5));
        ex.get_price(SYM).await.unwrap();
        assert_eq!(ex.get_order_status(SYM, sell.order_id).await.unwrap(), OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let ex = PaperExchange::new();
        ex.set_price(SYM, dec!(100));
        ex.fail_next(PaperOp::Price, "timeout");

        assert!(matches!(ex.get_price(SYM).await, Err(ExchangeError::Simulated(_))));
        assert_eq!(ex.get_price(SYM).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_open_orders_exclude_filled() {
        let ex = PaperExchange::new();
        let a = ex.seed_order(SYM, Side::Buy, dec!(1), dec!(90));
        let b = ex.seed_order(SYM, Side::Sell, dec!(1), dec!(110));
        ex.seed_order("BTCUSDT", Side::Buy, dec!(1), dec!(90));
        ex.fill(a);

        let open = ex.get_open_orders(SYM).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id, b);
    }

    #[tokio::test]
    async fn test_rejects_below_min_notional() {
        let ex = PaperExchange::new();
        ex.set_filters(
            SYM,
            SymbolFilters::new(dec!(0.001), dec!(0.001), dec!(0.01), dec!(0.01), dec!(10)).unwrap(),
        );
        let result = ex.place_limit_order(SYM, Side::Buy, dec!(0.05), dec!(100)).await;
        assert!(matches!(result, Err(ExchangeError::Request(_))));
        assert!(ex.orders(SYM).is_empty());
    }

    #[tokio::test]
    async fn test_accounts_only_see_their_own_orders() {
        let venue = Arc::new(PaperExchange::new());
        venue.set_price(SYM, dec!(100));
        let alice = PaperAccount::new(venue.clone(), "alice-key");
        let bob = PaperAccount::new(venue.clone(), "bob-key");

        let ack = alice.place_limit_order(SYM, Side::Buy, dec!(1), dec!(99)).await.unwrap();
        assert_eq!(venue.order(ack.order_id).unwrap().owner.as_deref(), Some("alice-key"));

        assert_eq!(alice.get_open_orders(SYM).await.unwrap().len(), 1);
        assert!(bob.get_open_orders(SYM).await.unwrap().is_empty());
        assert!(matches!(
            bob.get_order_status(SYM, ack.order_id).await,
            Err(ExchangeError::OrderNotFound(_))
        ));

        // Price moves are shared by every account
        venue.set_price(SYM, dec!(98));
        bob.get_price(SYM).await.unwrap();
        assert_eq!(
            alice.get_order_status(SYM, ack.order_id).await.unwrap(),
            OrderStatus::Filled
        );

        // The unowned view still sees the whole book
        assert_eq!(venue.orders(SYM).len(), 1);
    }

    #[tokio::test]
    async fn test_factory_scopes_connections_by_api_key() {
        let venue = Arc::new(PaperExchange::new());
        venue.seed_order_for("alice-key", SYM, Side::Buy, dec!(1), dec!(90));
        let factory = PaperFactory::new(venue);

        let bob = factory.connect(&Credentials::new("bob-key", "s")).unwrap();
        let alice = factory.connect(&Credentials::new("alice-key", "s")).unwrap();
        assert!(bob.get_open_orders(SYM).await.unwrap().is_empty());
        assert_eq!(alice.get_open_orders(SYM).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order_status() {
        let ex = PaperExchange::new();
        assert!(matches!(
            ex.get_order_status(SYM, 42).await,
            Err(ExchangeError::OrderNotFound(42))
        ));
    }
}
