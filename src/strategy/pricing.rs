use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::balances::BalanceTracker;
use crate::config::AppConfig;
use crate::domain::{Direction, Order, OrderSide, VenueRole};
use crate::error::{Result, XemmError};

/// Limit order the engine wants resting on the quote venue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub side: OrderSide,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Why a resting order must come off the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Order outlived the TTL
    Stale { age_ms: i64 },
    /// Reference moved so the order no longer clears the cancel edge
    EdgeTooThin,
    /// Reference moved away so the order sits beyond the maximum edge
    EdgeTooWide,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Stale { age_ms } => write!(f, "stale ({}ms)", age_ms),
            CancelReason::EdgeTooThin => write!(f, "edge below cancel threshold"),
            CancelReason::EdgeTooWide => write!(f, "edge above maximum"),
        }
    }
}

pub fn ceil_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    (value / tick).ceil() * tick
}

pub fn floor_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    (value / tick).floor() * tick
}

/// Pricing and sizing rules for one venue pair
#[derive(Debug, Clone)]
pub struct Pricer {
    base: String,
    quote: String,
    tick: Decimal,
    volume_step: Decimal,
    min_volume: Decimal,
    min_edge: Decimal,
    cancel_edge: Decimal,
    max_edge: Option<Decimal>,
    max_walk_ticks: u32,
    order_ttl_ms: i64,
    max_order_volume: Option<Decimal>,
}

impl Pricer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base: config.pair.base.clone(),
            quote: config.pair.quote.clone(),
            tick: config.quote_venue.tick_size,
            volume_step: config.quote_venue.volume_step,
            // The hedge has to clear the reference venue's minimum too
            min_volume: config
                .quote_venue
                .min_volume
                .max(config.reference_venue.min_volume),
            min_edge: config.strategy.min_edge(),
            cancel_edge: config.strategy.cancel_edge(),
            max_edge: config.strategy.max_edge(),
            max_walk_ticks: config.strategy.max_walk_ticks,
            order_ttl_ms: config.strategy.order_ttl_ms as i64,
            max_order_volume: config.strategy.max_order_volume,
        }
    }

    pub fn min_volume(&self) -> Decimal {
        self.min_volume
    }

    /// Resting price for the given reference and quote-venue touch.
    ///
    /// Returns None when no tick both clears the edge floor and stays strictly inside
    /// the venue's own best price on our side.
    pub fn quote_price(
        &self,
        direction: Direction,
        reference: Decimal,
        best_bid: Decimal,
        best_ask: Decimal,
    ) -> Option<Decimal> {
        let tick = self.tick;
        let walk = Decimal::from(self.max_walk_ticks) * tick;

        match direction.resting_side() {
            OrderSide::Sell => {
                let floor = ceil_to_tick(reference * (Decimal::ONE + self.min_edge), tick);
                let cap = best_ask - tick;
                let mut price = (floor + walk).min(cap);
                if price <= best_bid {
                    price = best_bid + tick;
                }
                (price >= floor && price <= cap).then_some(price)
            }
            OrderSide::Buy => {
                let floor = floor_to_tick(reference * (Decimal::ONE - self.min_edge), tick);
                let cap = best_bid + tick;
                let mut price = (floor - walk).max(cap);
                if price >= best_ask {
                    price = best_ask - tick;
                }
                (price <= floor && price >= cap).then_some(price)
            }
        }
    }

    /// Largest safe size: what the selling side can deliver and the buying side can pay for
    pub fn order_size(
        &self,
        direction: Direction,
        reference: Decimal,
        balances: &BalanceTracker,
    ) -> Result<Decimal> {
        if reference <= Decimal::ZERO {
            return Err(XemmError::NotAvailable("non-positive reference price".to_string()));
        }

        let raw = match direction {
            Direction::QuoteVenueSells => {
                let base = balances.available(VenueRole::Quote, &self.base)?;
                let funds = balances.available(VenueRole::Reference, &self.quote)?;
                base.min(funds / reference)
            }
            Direction::ReferenceVenueSells => {
                let funds = balances.available(VenueRole::Quote, &self.quote)?;
                let base = balances.available(VenueRole::Reference, &self.base)?;
                (funds / reference).min(base)
            }
        };

        let mut size = floor_to_tick(raw.max(Decimal::ZERO), self.volume_step);
        if let Some(cap) = self.max_order_volume {
            size = size.min(floor_to_tick(cap, self.volume_step));
        }

        if size < self.min_volume {
            return Err(XemmError::InsufficientBalance {
                size,
                min_volume: self.min_volume,
            });
        }

        Ok(size)
    }

    /// Price and size together; Ok(None) when the book leaves no room this cycle
    pub fn build_quote(
        &self,
        direction: Direction,
        reference: Decimal,
        best_bid: Decimal,
        best_ask: Decimal,
        balances: &BalanceTracker,
    ) -> Result<Option<Quote>> {
        let volume = self.order_size(direction, reference, balances)?;
        Ok(self
            .quote_price(direction, reference, best_bid, best_ask)
            .map(|price| Quote {
                side: direction.resting_side(),
                price,
                volume,
            }))
    }

    /// Check a resting order against the TTL and the profitable band
    pub fn cancel_reason(
        &self,
        order: &Order,
        reference: Decimal,
        now: DateTime<Utc>,
    ) -> Option<CancelReason> {
        let age_ms = order.age_ms(now);
        if age_ms >= self.order_ttl_ms {
            return Some(CancelReason::Stale { age_ms });
        }

        match order.side {
            OrderSide::Sell => {
                if order.price < reference * (Decimal::ONE + self.cancel_edge) {
                    return Some(CancelReason::EdgeTooThin);
                }
                if let Some(max_edge) = self.max_edge {
                    if order.price > reference * (Decimal::ONE + max_edge) {
                        return Some(CancelReason::EdgeTooWide);
                    }
                }
            }
            OrderSide::Buy => {
                if order.price > reference * (Decimal::ONE - self.cancel_edge) {
                    return Some(CancelReason::EdgeTooThin);
                }
                if let Some(max_edge) = self.max_edge {
                    if order.price < reference * (Decimal::ONE - max_edge) {
                        return Some(CancelReason::EdgeTooWide);
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Balance, OrderHandle};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn pricer() -> Pricer {
        Pricer::from_config(&AppConfig::default_config(true))
    }

    fn balances(
        quote_sol: Decimal,
        quote_usdt: Decimal,
        ref_sol: Decimal,
        ref_usdt: Decimal,
    ) -> BalanceTracker {
        let mut tracker = BalanceTracker::new();
        tracker.set(VenueRole::Quote, "sol", Balance::new(quote_sol, Decimal::ZERO));
        tracker.set(VenueRole::Quote, "usdt", Balance::new(quote_usdt, Decimal::ZERO));
        tracker.set(VenueRole::Reference, "sol", Balance::new(ref_sol, Decimal::ZERO));
        tracker.set(VenueRole::Reference, "usdt", Balance::new(ref_usdt, Decimal::ZERO));
        tracker
    }

    fn resting(side: OrderSide, price: Decimal, placed_at: DateTime<Utc>) -> Order {
        let handle = OrderHandle {
            id: "1".to_string(),
            client_order_id: "c-1".to_string(),
            side,
            price: Some(price),
            volume: dec!(1),
        };
        let mut order = Order::from_handle(&handle, price, placed_at);
        order.confirm();
        order
    }

    #[test]
    fn test_tick_rounding() {
        assert_eq!(ceil_to_tick(dec!(100.1), dec!(0.01)), dec!(100.10));
        assert_eq!(ceil_to_tick(dec!(100.1001), dec!(0.01)), dec!(100.11));
        assert_eq!(floor_to_tick(dec!(99.8999), dec!(0.01)), dec!(99.89));
        assert_eq!(floor_to_tick(dec!(1.23456), dec!(0.0001)), dec!(1.2345));
    }

    #[test]
    fn test_seller_walks_to_inside_best_ask() {
        // P = 100, 10 bps: floor 100.10, cap 100.24
        let price = pricer().quote_price(
            Direction::QuoteVenueSells,
            dec!(100),
            dec!(100.00),
            dec!(100.25),
        );
        assert_eq!(price, Some(dec!(100.24)));
    }

    #[test]
    fn test_seller_walk_is_bounded() {
        let mut config = AppConfig::default_config(true);
        config.strategy.max_walk_ticks = 5;
        let pricer = Pricer::from_config(&config);

        let price = pricer.quote_price(
            Direction::QuoteVenueSells,
            dec!(100),
            dec!(100.00),
            dec!(100.25),
        );
        assert_eq!(price, Some(dec!(100.15)));
    }

    #[test]
    fn test_seller_noop_when_book_too_tight() {
        // Best ask 100.10 leaves cap 100.09 below the floor 100.10
        let price = pricer().quote_price(
            Direction::QuoteVenueSells,
            dec!(100),
            dec!(100.00),
            dec!(100.10),
        );
        assert_eq!(price, None);
    }

    #[test]
    fn test_seller_clamps_above_best_bid() {
        // Candidate 100.30 would cross the 100.30 bid
        let price = pricer().quote_price(
            Direction::QuoteVenueSells,
            dec!(100),
            dec!(100.30),
            dec!(100.33),
        );
        assert_eq!(price, Some(dec!(100.31)));

        // One-tick spread: the clamp lands on the best ask
        let price = pricer().quote_price(
            Direction::QuoteVenueSells,
            dec!(100),
            dec!(100.30),
            dec!(100.31),
        );
        assert_eq!(price, None);
    }

    #[test]
    fn test_buyer_mirrors_seller() {
        // P = 100, floor 99.90, cap = best bid + tick
        let price = pricer().quote_price(
            Direction::ReferenceVenueSells,
            dec!(100),
            dec!(99.75),
            dec!(100.00),
        );
        assert_eq!(price, Some(dec!(99.76)));

        // Best bid above the floor leaves no room
        let price = pricer().quote_price(
            Direction::ReferenceVenueSells,
            dec!(100),
            dec!(99.90),
            dec!(100.00),
        );
        assert_eq!(price, None);
    }

    #[test]
    fn test_size_limited_by_both_venues() {
        // Seller: min(1.23456 SOL, 50 USDT / 100 = 0.5)
        let tracker = balances(dec!(1.23456), dec!(0), dec!(0), dec!(50));
        assert_eq!(
            pricer().order_size(Direction::QuoteVenueSells, dec!(100), &tracker).unwrap(),
            dec!(0.5)
        );

        // Buyer: min(12.3456 USDT / 100, 3 SOL) floored to step
        let tracker = balances(dec!(0), dec!(12.3456), dec!(3), dec!(0));
        assert_eq!(
            pricer().order_size(Direction::ReferenceVenueSells, dec!(100), &tracker).unwrap(),
            dec!(0.1234)
        );
    }

    #[test]
    fn test_size_cap() {
        let mut config = AppConfig::default_config(true);
        config.strategy.max_order_volume = Some(dec!(0.25));
        let pricer = Pricer::from_config(&config);

        let tracker = balances(dec!(10), dec!(0), dec!(0), dec!(10000));
        assert_eq!(
            pricer.order_size(Direction::QuoteVenueSells, dec!(100), &tracker).unwrap(),
            dec!(0.25)
        );
    }

    #[test]
    fn test_size_below_minimum_is_insufficient() {
        let tracker = balances(dec!(0.0001), dec!(0), dec!(0), dec!(1000));
        match pricer().order_size(Direction::QuoteVenueSells, dec!(100), &tracker) {
            Err(XemmError::InsufficientBalance { size, min_volume }) => {
                assert_eq!(size, dec!(0.0001));
                assert_eq!(min_volume, dec!(0.0002));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_size_with_unknown_balance() {
        let mut tracker = BalanceTracker::new();
        tracker.set(VenueRole::Quote, "sol", Balance::new(dec!(1), Decimal::ZERO));
        assert!(matches!(
            pricer().order_size(Direction::QuoteVenueSells, dec!(100), &tracker),
            Err(XemmError::BalanceUnknown { .. })
        ));
    }

    #[test]
    fn test_stale_order_cancelled() {
        let placed_at = Utc::now();
        let order = resting(OrderSide::Sell, dec!(100.24), placed_at);

        assert_eq!(pricer().cancel_reason(&order, dec!(100), placed_at + Duration::seconds(5)), None);
        assert_eq!(
            pricer().cancel_reason(&order, dec!(100), placed_at + Duration::seconds(11)),
            Some(CancelReason::Stale { age_ms: 11_000 })
        );
    }

    #[test]
    fn test_band_cancel() {
        let now = Utc::now();
        let sell = resting(OrderSide::Sell, dec!(100.24), now);
        // 100.24 < 100.2 * 1.0007 = 100.27014
        assert_eq!(pricer().cancel_reason(&sell, dec!(100.2), now), Some(CancelReason::EdgeTooThin));
        assert_eq!(pricer().cancel_reason(&sell, dec!(100.1), now), None);

        let buy = resting(OrderSide::Buy, dec!(99.76), now);
        // 99.76 > 99.8 * 0.9993 = 99.73014
        assert_eq!(pricer().cancel_reason(&buy, dec!(99.8), now), Some(CancelReason::EdgeTooThin));
        assert_eq!(pricer().cancel_reason(&buy, dec!(99.9), now), None);
    }

    #[test]
    fn test_max_edge_band() {
        let mut config = AppConfig::default_config(true);
        config.strategy.max_edge_bps = Some(50);
        let pricer = Pricer::from_config(&config);
        let now = Utc::now();

        let sell = resting(OrderSide::Sell, dec!(100.24), now);
        // Reference fell to 99: 100.24 > 99 * 1.005 = 99.495
        assert_eq!(pricer.cancel_reason(&sell, dec!(99), now), Some(CancelReason::EdgeTooWide));
        assert_eq!(pricer.cancel_reason(&sell, dec!(100), now), None);
    }
}
