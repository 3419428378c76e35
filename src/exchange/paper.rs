//! In-process venue for dry runs and tests.
//!
//! Tracks resting orders and balances locally, records every call, and pushes the same
//! lifecycle events a live venue stream would (confirmations, cancellations, fills).

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{EventSink, VenueClient};
use crate::config::AppConfig;
use crate::domain::{
    Balance, BalanceUpdate, EngineEvent, OrderHandle, OrderRequest, OrderSide, OrderType,
    OrderUpdate, VenueRole,
};
use crate::error::{Result, XemmError};
use crate::market_data::OrderBook;

#[derive(Debug, Clone)]
pub struct PaperVenueConfig {
    /// Push a confirmation for every accepted limit order
    pub auto_confirm: bool,
    /// Push a cancellation for every cancelled order
    pub confirm_cancels: bool,
    /// Fill resting orders when this venue's book or trades cross them
    pub simulate_fills: bool,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            auto_confirm: true,
            confirm_cancels: true,
            simulate_fills: false,
        }
    }
}

/// Resting limit order held by the paper venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperOrder {
    pub id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub remaining: Decimal,
}

/// Calls received, in order, for inspection
#[derive(Debug, Clone, Default)]
pub struct PaperActivity {
    pub limit_orders: Vec<OrderRequest>,
    pub market_orders: Vec<OrderRequest>,
    pub cancels: Vec<String>,
    pub cancel_all: Vec<OrderSide>,
    pub balance_pulls: usize,
    pub connects: usize,
    pub closes: usize,
}

struct PaperState {
    next_order_id: u64,
    next_trade_id: u64,
    sink: Option<EventSink>,
    balances: HashMap<String, Balance>,
    resting: BTreeMap<String, PaperOrder>,
    book: OrderBook,
    last_trade: Option<Decimal>,
    mark_price: Option<Decimal>,
    activity: PaperActivity,
}

impl PaperState {
    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            // Receiver gone means the engine has shut down
            let _ = sink.send(event);
        }
    }

    fn balance_mut(&mut self, currency: &str) -> &mut Balance {
        self.balances
            .entry(currency.to_ascii_lowercase())
            .or_default()
    }

    fn balance_snapshot(&self) -> Vec<BalanceUpdate> {
        let mut updates: Vec<BalanceUpdate> = self
            .balances
            .iter()
            .map(|(currency, balance)| BalanceUpdate {
                currency: currency.clone(),
                available: balance.available,
                locked: balance.locked,
            })
            .collect();
        updates.sort_by(|a, b| a.currency.cmp(&b.currency));
        updates
    }

    fn next_trade_id(&mut self) -> String {
        self.next_trade_id += 1;
        format!("paper-trade-{}", self.next_trade_id)
    }

    /// Price a market order would execute at
    fn execution_price(&self, side: OrderSide) -> Option<Decimal> {
        let touch = match side {
            OrderSide::Buy => self.book.best_ask().ok(),
            OrderSide::Sell => self.book.best_bid().ok(),
        };
        touch.or(self.last_trade).or(self.mark_price)
    }
}

pub struct PaperVenue {
    role: VenueRole,
    base: String,
    quote: String,
    config: PaperVenueConfig,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(
        role: VenueRole,
        base: &str,
        quote: &str,
        balances: &HashMap<String, Decimal>,
        config: PaperVenueConfig,
    ) -> Self {
        let balances = balances
            .iter()
            .map(|(currency, amount)| {
                (
                    currency.to_ascii_lowercase(),
                    Balance::new(*amount, Decimal::ZERO),
                )
            })
            .collect();

        Self {
            role,
            base: base.to_ascii_lowercase(),
            quote: quote.to_ascii_lowercase(),
            config,
            state: Mutex::new(PaperState {
                next_order_id: 0,
                next_trade_id: 0,
                sink: None,
                balances,
                resting: BTreeMap::new(),
                book: OrderBook::new(20),
                last_trade: None,
                mark_price: None,
                activity: PaperActivity::default(),
            }),
        }
    }

    /// Build a paper venue for one role from the `paper` configuration section
    pub fn from_config(role: VenueRole, config: &AppConfig) -> Self {
        let balances = match role {
            VenueRole::Quote => &config.paper.quote_balances,
            VenueRole::Reference => &config.paper.reference_balances,
        };
        Self::new(
            role,
            &config.pair.base,
            &config.pair.quote,
            balances,
            PaperVenueConfig {
                simulate_fills: config.paper.simulate_fills,
                ..PaperVenueConfig::default()
            },
        )
    }

    /// Price used for market orders when no book or trade has been observed
    pub fn with_mark_price(self, price: Decimal) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            state.mark_price = Some(price);
        }
        self
    }

    pub fn role(&self) -> VenueRole {
        self.role
    }

    pub async fn activity(&self) -> PaperActivity {
        self.state.lock().await.activity.clone()
    }

    pub async fn resting_orders(&self) -> Vec<PaperOrder> {
        self.state.lock().await.resting.values().cloned().collect()
    }

    pub async fn balance(&self, currency: &str) -> Balance {
        self.state
            .lock()
            .await
            .balances
            .get(&currency.to_ascii_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.sink.is_some()
    }

    /// Execute `volume` of a resting order and push the fill
    pub async fn fill(&self, order_id: &str, volume: Decimal) -> Result<()> {
        let mut state = self.state.lock().await;
        self.fill_locked(&mut state, order_id, volume)
    }

    /// Let the venue see market data about itself; crossing orders fill when enabled
    pub async fn observe(&self, event: &EngineEvent) {
        let mut state = self.state.lock().await;

        match event {
            EngineEvent::BookSnapshot { venue, bids, asks } if *venue == self.role => {
                state.book.apply_snapshot(bids, asks);
            }
            EngineEvent::BookDelta { venue, bids, asks } if *venue == self.role => {
                state.book.apply_delta(bids, asks);
            }
            EngineEvent::Trade { venue, price, .. } if *venue == self.role => {
                state.last_trade = Some(*price);
            }
            _ => return,
        }

        if !self.config.simulate_fills {
            return;
        }

        let best_bid = state.book.best_bid().ok();
        let best_ask = state.book.best_ask().ok();
        let last_trade = state.last_trade;

        let crossed: Vec<(String, Decimal)> = state
            .resting
            .values()
            .filter(|order| match order.side {
                OrderSide::Sell => {
                    best_bid.is_some_and(|bid| bid >= order.price)
                        || last_trade.is_some_and(|trade| trade >= order.price)
                }
                OrderSide::Buy => {
                    best_ask.is_some_and(|ask| ask <= order.price)
                        || last_trade.is_some_and(|trade| trade <= order.price)
                }
            })
            .map(|order| (order.id.clone(), order.remaining))
            .collect();

        for (order_id, remaining) in crossed {
            if let Err(e) = self.fill_locked(&mut state, &order_id, remaining) {
                debug!("Paper {} fill of {} skipped: {}", self.role, order_id, e);
            }
        }
    }

    fn fill_locked(&self, state: &mut PaperState, order_id: &str, volume: Decimal) -> Result<()> {
        let order = state.resting.get_mut(order_id).ok_or_else(|| {
            XemmError::venue_rejected(self.role, "order_not_found", order_id.to_string())
        })?;

        let volume = volume.min(order.remaining);
        order.remaining -= volume;
        let side = order.side;
        let price = order.price;
        if order.remaining.is_zero() {
            state.resting.remove(order_id);
        }

        let notional = volume * price;
        match side {
            OrderSide::Sell => {
                state.balance_mut(&self.base).locked -= volume;
                state.balance_mut(&self.quote).available += notional;
            }
            OrderSide::Buy => {
                state.balance_mut(&self.quote).locked -= notional;
                state.balance_mut(&self.base).available += volume;
            }
        }

        let trade_id = state.next_trade_id();
        info!(
            "Paper {} filled {} {} @ {} ({})",
            self.role, side, volume, price, order_id
        );
        state.emit(EngineEvent::Order {
            venue: self.role,
            update: OrderUpdate::Filled {
                order_id: order_id.to_string(),
                trade_id,
                side,
                price,
                volume,
            },
        });
        let balances = state.balance_snapshot();
        state.emit(EngineEvent::Balances {
            venue: self.role,
            balances,
        });
        Ok(())
    }

    fn release(&self, state: &mut PaperState, order: &PaperOrder) {
        match order.side {
            OrderSide::Sell => {
                let base = state.balance_mut(&self.base);
                base.locked -= order.remaining;
                base.available += order.remaining;
            }
            OrderSide::Buy => {
                let notional = order.remaining * order.price;
                let quote = state.balance_mut(&self.quote);
                quote.locked -= notional;
                quote.available += notional;
            }
        }
        if self.config.confirm_cancels {
            state.emit(EngineEvent::Order {
                venue: self.role,
                update: OrderUpdate::Cancelled {
                    order_id: order.id.clone(),
                },
            });
        }
    }

    fn place_limit(
        &self,
        state: &mut PaperState,
        request: &OrderRequest,
        order_id: String,
    ) -> Result<()> {
        let price = request.price.ok_or_else(|| {
            XemmError::venue_rejected(self.role, "invalid_price", "limit order without price")
        })?;

        match request.side {
            OrderSide::Sell => {
                let base = state.balance_mut(&self.base);
                if base.available < request.volume {
                    return Err(XemmError::venue_rejected(
                        self.role,
                        "insufficient_balance",
                        format!("{} available {}", self.base, base.available),
                    ));
                }
                base.available -= request.volume;
                base.locked += request.volume;
            }
            OrderSide::Buy => {
                let notional = price * request.volume;
                let quote = state.balance_mut(&self.quote);
                if quote.available < notional {
                    return Err(XemmError::venue_rejected(
                        self.role,
                        "insufficient_balance",
                        format!("{} available {}", self.quote, quote.available),
                    ));
                }
                quote.available -= notional;
                quote.locked += notional;
            }
        }

        state.resting.insert(
            order_id.clone(),
            PaperOrder {
                id: order_id.clone(),
                side: request.side,
                price,
                remaining: request.volume,
            },
        );

        if self.config.auto_confirm {
            state.emit(EngineEvent::Order {
                venue: self.role,
                update: OrderUpdate::Confirmed {
                    order_id,
                    side: request.side,
                    price: Some(price),
                    volume: request.volume,
                    remaining: request.volume,
                },
            });
        }
        Ok(())
    }

    fn execute_market(
        &self,
        state: &mut PaperState,
        request: &OrderRequest,
        order_id: &str,
    ) -> Result<Decimal> {
        let price = state.execution_price(request.side).ok_or_else(|| {
            XemmError::venue_rejected(self.role, "no_liquidity", "no price to execute against")
        })?;
        let notional = price * request.volume;

        match request.side {
            OrderSide::Sell => {
                state.balance_mut(&self.base).available -= request.volume;
                state.balance_mut(&self.quote).available += notional;
            }
            OrderSide::Buy => {
                state.balance_mut(&self.quote).available -= notional;
                state.balance_mut(&self.base).available += request.volume;
            }
        }

        let trade_id = state.next_trade_id();
        state.emit(EngineEvent::Order {
            venue: self.role,
            update: OrderUpdate::Filled {
                order_id: order_id.to_string(),
                trade_id,
                side: request.side,
                price,
                volume: request.volume,
            },
        });
        let balances = state.balance_snapshot();
        state.emit(EngineEvent::Balances {
            venue: self.role,
            balances,
        });
        Ok(price)
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let mut state = self.state.lock().await;
        state.next_order_id += 1;
        let order_id = format!("{}", state.next_order_id);

        let price = match request.order_type {
            OrderType::Limit => {
                state.activity.limit_orders.push(request.clone());
                self.place_limit(&mut state, request, order_id.clone())?;
                request.price
            }
            OrderType::Market => {
                state.activity.market_orders.push(request.clone());
                Some(self.execute_market(&mut state, request, &order_id)?)
            }
        };

        debug!(
            "Paper {} accepted {:?} {} {} @ {:?} as {}",
            self.role, request.order_type, request.side, request.volume, price, order_id
        );

        Ok(OrderHandle {
            id: order_id,
            client_order_id: request.client_order_id.clone(),
            side: request.side,
            price,
            volume: request.volume,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.activity.cancels.push(order_id.to_string());

        let order = state.resting.remove(order_id).ok_or_else(|| {
            XemmError::venue_rejected(self.role, "order_not_found", order_id.to_string())
        })?;
        self.release(&mut state, &order);
        Ok(())
    }

    async fn cancel_all(&self, side: OrderSide) -> Result<()> {
        let mut state = self.state.lock().await;
        state.activity.cancel_all.push(side);

        let ids: Vec<String> = state
            .resting
            .values()
            .filter(|order| order.side == side)
            .map(|order| order.id.clone())
            .collect();
        for id in ids {
            if let Some(order) = state.resting.remove(&id) {
                self.release(&mut state, &order);
            }
        }
        Ok(())
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>> {
        let mut state = self.state.lock().await;
        state.activity.balance_pulls += 1;
        Ok(state.balances.clone())
    }

    async fn connect(&self, sink: EventSink) -> Result<()> {
        let mut state = self.state.lock().await;
        state.activity.connects += 1;
        state.sink = Some(sink);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.sink.take().is_some() {
            state.activity.closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceLevel;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn venue(config: PaperVenueConfig) -> PaperVenue {
        let mut balances = HashMap::new();
        balances.insert("sol".to_string(), dec!(2));
        balances.insert("usdt".to_string(), dec!(500));
        PaperVenue::new(VenueRole::Quote, "sol", "usdt", &balances, config)
    }

    #[tokio::test]
    async fn test_limit_order_confirms_and_locks() {
        let venue = venue(PaperVenueConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        venue.connect(tx).await.unwrap();

        let handle = venue
            .place_order(&OrderRequest::limit(OrderSide::Sell, dec!(100.24), dec!(1.5)))
            .await
            .unwrap();
        assert_eq!(handle.id, "1");

        match rx.try_recv().unwrap() {
            EngineEvent::Order {
                venue,
                update: OrderUpdate::Confirmed { order_id, remaining, .. },
            } => {
                assert_eq!(venue, VenueRole::Quote);
                assert_eq!(order_id, "1");
                assert_eq!(remaining, dec!(1.5));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let sol = venue.balance("sol").await;
        assert_eq!(sol.available, dec!(0.5));
        assert_eq!(sol.locked, dec!(1.5));
    }

    #[tokio::test]
    async fn test_limit_order_rejected_without_balance() {
        let venue = venue(PaperVenueConfig::default());
        let result = venue
            .place_order(&OrderRequest::limit(OrderSide::Sell, dec!(100), dec!(5)))
            .await;

        assert!(matches!(result, Err(XemmError::VenueRejected { .. })));
        assert!(venue.resting_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_releases_and_confirms() {
        let venue = venue(PaperVenueConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        venue.connect(tx).await.unwrap();

        venue
            .place_order(&OrderRequest::limit(OrderSide::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();
        venue.cancel_all(OrderSide::Buy).await.unwrap();

        let _confirmed = rx.try_recv().unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::Order {
                update: OrderUpdate::Cancelled { .. },
                ..
            }
        ));
        assert_eq!(venue.balance("usdt").await.available, dec!(500));
        assert_eq!(venue.activity().await.cancel_all, vec![OrderSide::Buy]);
        assert!(venue.cancel_order("1").await.is_err());
    }

    #[tokio::test]
    async fn test_market_order_needs_a_price() {
        let venue = venue(PaperVenueConfig::default());
        let request = OrderRequest::market(OrderSide::Buy, dec!(0.5));
        assert!(venue.place_order(&request).await.is_err());

        let venue = venue_with_mark();
        let handle = venue.place_order(&request).await.unwrap();
        assert_eq!(handle.price, Some(dec!(100)));
        assert_eq!(venue.balance("sol").await.available, dec!(2.5));
        assert_eq!(venue.balance("usdt").await.available, dec!(450));
    }

    fn venue_with_mark() -> PaperVenue {
        venue(PaperVenueConfig::default()).with_mark_price(dec!(100))
    }

    #[tokio::test]
    async fn test_simulated_fill_on_crossing_book() {
        let venue = venue(PaperVenueConfig {
            simulate_fills: true,
            auto_confirm: false,
            ..PaperVenueConfig::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        venue.connect(tx).await.unwrap();

        venue
            .place_order(&OrderRequest::limit(OrderSide::Sell, dec!(100.24), dec!(1)))
            .await
            .unwrap();

        venue
            .observe(&EngineEvent::BookSnapshot {
                venue: VenueRole::Quote,
                bids: vec![PriceLevel::new(dec!(100.30), dec!(3))],
                asks: vec![PriceLevel::new(dec!(100.40), dec!(3))],
            })
            .await;

        match rx.try_recv().unwrap() {
            EngineEvent::Order {
                update: OrderUpdate::Filled { order_id, volume, .. },
                ..
            } => {
                assert_eq!(order_id, "1");
                assert_eq!(volume, dec!(1));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(venue.resting_orders().await.is_empty());
        assert_eq!(venue.balance("usdt").await.available, dec!(600.24));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let venue = venue(PaperVenueConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        venue.connect(tx).await.unwrap();

        venue.close().await.unwrap();
        venue.close().await.unwrap();

        let activity = venue.activity().await;
        assert_eq!(activity.connects, 1);
        assert_eq!(activity.closes, 1);
        assert!(!venue.is_connected().await);
    }
}
