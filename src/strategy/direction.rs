use tracing::info;

use crate::balances::BalanceTracker;
use crate::config::{AppConfig, DirectionMode};
use crate::domain::{Direction, VenueRole};
use crate::error::{Result, XemmError};
use crate::market_data::MarketDataView;

/// Decide which venue sells, from configuration or quote-venue inventory.
///
/// In inventory mode the quote venue sells when the value of its base holdings at the
/// quote-venue mid is at least its quote-currency holdings.
pub fn determine_direction(
    config: &AppConfig,
    market: &MarketDataView,
    balances: &BalanceTracker,
) -> Result<Direction> {
    match config.strategy.direction_mode {
        DirectionMode::Fixed => config.strategy.fixed_direction.ok_or_else(|| {
            XemmError::DirectionUnavailable("fixed mode without fixed_direction".to_string())
        }),
        DirectionMode::Inventory => inventory_direction(config, market, balances),
    }
}

fn inventory_direction(
    config: &AppConfig,
    market: &MarketDataView,
    balances: &BalanceTracker,
) -> Result<Direction> {
    let unavailable = |e: XemmError| XemmError::DirectionUnavailable(e.to_string());

    let base_total = balances
        .total(VenueRole::Quote, &config.pair.base)
        .map_err(unavailable)?;
    let quote_total = balances
        .total(VenueRole::Quote, &config.pair.quote)
        .map_err(unavailable)?;
    let mid = market.book(VenueRole::Quote).mid().map_err(unavailable)?;

    let base_value = base_total * mid;
    let direction = if base_value >= quote_total {
        Direction::QuoteVenueSells
    } else {
        Direction::ReferenceVenueSells
    };

    info!(
        "Direction {}: {} {} (~{} {}) vs {} {} at mid {}",
        direction,
        base_total,
        config.pair.base,
        base_value.round_dp(2),
        config.pair.quote,
        quote_total,
        config.pair.quote,
        mid
    );

    Ok(direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Balance, EngineEvent, PriceLevel};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn market(bid: Decimal, ask: Decimal) -> MarketDataView {
        let config = AppConfig::default_config(true);
        let mut view = MarketDataView::new(&config.market_data);
        view.apply(&EngineEvent::BookSnapshot {
            venue: VenueRole::Quote,
            bids: vec![PriceLevel::new(bid, dec!(1))],
            asks: vec![PriceLevel::new(ask, dec!(1))],
        });
        view
    }

    fn balances(sol: Decimal, usdt: Decimal) -> BalanceTracker {
        let mut tracker = BalanceTracker::new();
        tracker.set(VenueRole::Quote, "sol", Balance::new(sol, Decimal::ZERO));
        tracker.set(VenueRole::Quote, "usdt", Balance::new(usdt, Decimal::ZERO));
        tracker
    }

    #[test]
    fn test_inventory_direction() {
        let config = AppConfig::default_config(true);
        let view = market(dec!(99), dec!(101));

        // 2 SOL * 100 = 200 >= 150 USDT
        assert_eq!(
            determine_direction(&config, &view, &balances(dec!(2), dec!(150))).unwrap(),
            Direction::QuoteVenueSells
        );
        // 1 SOL * 100 = 100 < 150 USDT
        assert_eq!(
            determine_direction(&config, &view, &balances(dec!(1), dec!(150))).unwrap(),
            Direction::ReferenceVenueSells
        );
        // Tie goes to the quote venue
        assert_eq!(
            determine_direction(&config, &view, &balances(dec!(1.5), dec!(150))).unwrap(),
            Direction::QuoteVenueSells
        );
    }

    #[test]
    fn test_inventory_direction_needs_market_and_balances() {
        let config = AppConfig::default_config(true);
        let empty_view = MarketDataView::new(&config.market_data);

        assert!(matches!(
            determine_direction(&config, &empty_view, &balances(dec!(1), dec!(1))),
            Err(XemmError::DirectionUnavailable(_))
        ));
        assert!(matches!(
            determine_direction(&config, &market(dec!(99), dec!(101)), &BalanceTracker::new()),
            Err(XemmError::DirectionUnavailable(_))
        ));
    }

    #[test]
    fn test_fixed_direction() {
        let mut config = AppConfig::default_config(true);
        config.strategy.direction_mode = DirectionMode::Fixed;
        config.strategy.fixed_direction = Some(Direction::ReferenceVenueSells);

        let empty_view = MarketDataView::new(&config.market_data);
        assert_eq!(
            determine_direction(&config, &empty_view, &BalanceTracker::new()).unwrap(),
            Direction::ReferenceVenueSells
        );
    }
}
