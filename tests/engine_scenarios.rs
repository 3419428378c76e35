//! End-to-end engine behaviour against paper venues

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use xemm::config::{AppConfig, DirectionMode, ReferencePriceMode};
use xemm::domain::{
    Direction, EngineEvent, EngineState, OrderSide, OrderStatus, OrderUpdate, PriceLevel,
    TimerEvent, VenueRole,
};
use xemm::exchange::{build_paper_venues, PaperVenue, PaperVenueConfig};
use xemm::feed::ReplayFeed;
use xemm::strategy::{EngineRunner, XemmEngine};

fn config(direction: Direction) -> AppConfig {
    let mut config = AppConfig::default_config(true);
    config.market_data.reference_price = ReferencePriceMode::LastTrade;
    config.strategy.direction_mode = DirectionMode::Fixed;
    config.strategy.fixed_direction = Some(direction);
    config.recovery.cancel_grace_ms = 50;
    config.recovery.restart_interval_secs = 0;
    config
}

fn paper(
    role: VenueRole,
    sol: Decimal,
    usdt: Decimal,
    venue_config: PaperVenueConfig,
) -> Arc<PaperVenue> {
    let mut balances = HashMap::new();
    balances.insert("sol".to_string(), sol);
    balances.insert("usdt".to_string(), usdt);
    Arc::new(
        PaperVenue::new(role, "sol", "usdt", &balances, venue_config).with_mark_price(dec!(100)),
    )
}

fn quote_book(bid: Decimal, ask: Decimal) -> EngineEvent {
    EngineEvent::BookSnapshot {
        venue: VenueRole::Quote,
        bids: vec![PriceLevel::new(bid, dec!(5))],
        asks: vec![PriceLevel::new(ask, dec!(5))],
    }
}

fn reference_trade(price: Decimal) -> EngineEvent {
    EngineEvent::Trade {
        venue: VenueRole::Reference,
        price,
        volume: dec!(0.1),
    }
}

struct Scenario {
    engine: XemmEngine,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    quote: Arc<PaperVenue>,
    reference: Arc<PaperVenue>,
}

impl Scenario {
    async fn new(config: AppConfig, quote: Arc<PaperVenue>, reference: Arc<PaperVenue>) -> Self {
        let (sink, events) = mpsc::unbounded_channel();
        let mut engine = XemmEngine::new(config, quote.clone(), reference.clone(), sink);
        engine.start().await.unwrap();
        engine
            .handle(quote_book(dec!(100.00), dec!(100.25)))
            .await
            .unwrap();
        engine.activate().unwrap();
        Self {
            engine,
            events,
            quote,
            reference,
        }
    }

    /// Seller on the quote venue with 2 SOL, buyer funds on the reference venue
    async fn seller(config: AppConfig) -> Self {
        let quote = paper(VenueRole::Quote, dec!(2), dec!(0), PaperVenueConfig::default());
        let reference = paper(
            VenueRole::Reference,
            dec!(0),
            dec!(1000),
            PaperVenueConfig::default(),
        );
        Self::new(config, quote, reference).await
    }

    async fn tick(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.engine
            .handle_at(reference_trade(price), now)
            .await
            .unwrap();
    }

    async fn drain(&mut self, now: DateTime<Utc>) {
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, EngineEvent::Timer(_) | EngineEvent::Restart { .. }) {
                continue;
            }
            self.engine.handle_at(event, now).await.unwrap();
        }
    }

    /// Place and confirm one sell order; returns its id
    async fn resting_sell(&mut self, now: DateTime<Utc>) -> String {
        self.tick(dec!(100.00), now).await;
        let order_id = self.engine.pending_placement().unwrap().order.id.clone();
        self.drain(now).await;
        assert_eq!(self.engine.state(), EngineState::Idle);
        order_id
    }
}

// ==================== Pricing and lifecycle ====================

#[tokio::test]
async fn test_quotes_most_aggressive_tick_inside_the_edge() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    s.tick(dec!(100.00), Utc::now()).await;

    let activity = s.quote.activity().await;
    assert_eq!(activity.limit_orders.len(), 1);
    let request = &activity.limit_orders[0];
    assert_eq!(request.side, OrderSide::Sell);
    assert_eq!(request.price, Some(dec!(100.24)));
    assert!(request.price.unwrap() >= dec!(100.10));
}

#[tokio::test]
async fn test_confirmed_order_matches_request() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let order_id = s.resting_sell(Utc::now()).await;

    let order = s.engine.active_order(&order_id).unwrap();
    let request = s.quote.activity().await.limit_orders[0].clone();
    assert_eq!(order.side, request.side);
    assert_eq!(Some(order.price), request.price);
    assert_eq!(order.volume, request.volume);
    assert_eq!(order.remaining, order.volume);
    assert_eq!(order.status, OrderStatus::Open);
}

#[tokio::test]
async fn test_stale_order_is_cancelled() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let placed_at = Utc::now();
    let order_id = s.resting_sell(placed_at).await;

    let later = placed_at + ChronoDuration::seconds(11);
    s.tick(dec!(100.01), later).await;

    assert_eq!(s.engine.state(), EngineState::Cancelling);
    assert_eq!(s.quote.activity().await.cancels, vec![order_id.clone()]);
    assert!(s.engine.cancel_intent(&order_id).is_some());

    s.drain(later).await;
    assert_eq!(s.engine.state(), EngineState::Idle);
    assert!(s.engine.active_orders().is_empty());
}

#[tokio::test]
async fn test_stale_order_is_cancelled_in_flat_market() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let placed_at = Utc::now();
    let order_id = s.resting_sell(placed_at).await;

    // Same print as at placement: only the order's age makes it invalid
    let later = placed_at + ChronoDuration::seconds(11);
    s.tick(dec!(100.00), later).await;

    assert_eq!(s.engine.state(), EngineState::Cancelling);
    assert_eq!(s.quote.activity().await.cancels, vec![order_id]);
}

#[tokio::test]
async fn test_fresh_order_survives_small_move() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let placed_at = Utc::now();
    let order_id = s.resting_sell(placed_at).await;

    s.tick(dec!(100.01), placed_at + ChronoDuration::seconds(2))
        .await;

    assert_eq!(s.engine.state(), EngineState::Idle);
    assert!(s.engine.active_order(&order_id).is_some());
    assert!(s.quote.activity().await.cancels.is_empty());
}

// ==================== Recovery ====================

#[tokio::test]
async fn test_lost_placement_confirmation_reconciles() {
    let quote = paper(
        VenueRole::Quote,
        dec!(2),
        dec!(0),
        PaperVenueConfig {
            auto_confirm: false,
            ..PaperVenueConfig::default()
        },
    );
    let reference = paper(
        VenueRole::Reference,
        dec!(0),
        dec!(1000),
        PaperVenueConfig::default(),
    );
    let mut s = Scenario::new(config(Direction::QuoteVenueSells), quote, reference).await;
    let now = Utc::now();

    s.tick(dec!(100.00), now).await;
    assert_eq!(s.engine.state(), EngineState::Placing);
    let intent_id = s.engine.pending_placement().unwrap().intent_id;

    let started = Instant::now();
    s.engine
        .handle_at(
            EngineEvent::Timer(TimerEvent::PlacementTimeout { intent_id }),
            now,
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(
        s.quote.activity().await.cancel_all,
        vec![OrderSide::Sell, OrderSide::Sell]
    );
    assert_eq!(s.engine.stats().reconciliations, 1);

    // The lost placement is gone and quoting resumed under a fresh intent
    let retry = s.engine.pending_placement().unwrap();
    assert_ne!(retry.intent_id, intent_id);
    let resting = s.quote.resting_orders().await;
    assert_eq!(resting.len(), 1);
    assert_eq!(resting[0].id, retry.order.id);
    assert!(s.engine.active_orders().is_empty());
    assert_eq!(s.engine.identity().placed_count(), 1);
    assert_eq!(s.engine.state(), EngineState::Placing);
    assert_eq!(s.quote.activity().await.limit_orders.len(), 2);
}

#[tokio::test]
async fn test_size_below_minimum_reverses_once() {
    let quote = paper(
        VenueRole::Quote,
        dec!(0.0001),
        dec!(500),
        PaperVenueConfig::default(),
    );
    let reference = paper(
        VenueRole::Reference,
        dec!(10),
        dec!(1000),
        PaperVenueConfig::default(),
    );
    let mut s = Scenario::new(config(Direction::QuoteVenueSells), quote, reference).await;
    let now = Utc::now();

    s.tick(dec!(100.00), now).await;

    assert!(s.quote.activity().await.limit_orders.is_empty());
    assert_eq!(s.engine.stats().reversals, 1);
    assert_eq!(s.engine.direction(), Some(Direction::ReferenceVenueSells));
    assert_eq!(s.engine.state(), EngineState::Idle);

    // The reversed direction has inventory; 100.20 leaves room above the 100.00 bid
    s.tick(dec!(100.20), now).await;
    let activity = s.quote.activity().await;
    assert_eq!(activity.limit_orders.len(), 1);
    assert_eq!(activity.limit_orders[0].side, OrderSide::Buy);
    assert_eq!(activity.limit_orders[0].price, Some(dec!(100.01)));
    assert_eq!(s.engine.stats().reversals, 1);
}

// ==================== Fills and hedges ====================

#[tokio::test]
async fn test_every_fill_is_hedged_once() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let now = Utc::now();
    let order_id = s.resting_sell(now).await;

    s.quote.fill(&order_id, dec!(0.5)).await.unwrap();
    s.drain(now).await;
    s.quote.fill(&order_id, dec!(0.25)).await.unwrap();
    s.drain(now).await;

    let hedges = s.reference.activity().await.market_orders;
    assert_eq!(hedges.len(), 2);
    assert!(hedges.iter().all(|h| h.side == OrderSide::Buy));
    assert_eq!(hedges[0].volume, dec!(0.5));
    assert_eq!(hedges[1].volume, dec!(0.25));

    let order = s.engine.active_order(&order_id).unwrap();
    assert_eq!(order.remaining, order.volume - dec!(0.75));
    assert_eq!(s.engine.state(), EngineState::Idle);
    assert_eq!(s.engine.hedges().pending_count(), 0);
}

#[tokio::test]
async fn test_replayed_fill_is_applied_once() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let now = Utc::now();
    let order_id = s.resting_sell(now).await;
    let volume = s.engine.active_order(&order_id).unwrap().volume;

    let fill = EngineEvent::Order {
        venue: VenueRole::Quote,
        update: OrderUpdate::Filled {
            order_id: order_id.clone(),
            trade_id: "t-1".to_string(),
            side: OrderSide::Sell,
            price: dec!(100.24),
            volume: dec!(0.4),
        },
    };
    s.engine.handle_at(fill.clone(), now).await.unwrap();
    s.engine.handle_at(fill, now).await.unwrap();

    assert_eq!(
        s.engine.active_order(&order_id).unwrap().remaining,
        volume - dec!(0.4)
    );
    assert_eq!(s.reference.activity().await.market_orders.len(), 1);
    assert_eq!(s.engine.stats().fills, 1);
}

#[tokio::test]
async fn test_replayed_cancel_removes_order_once() {
    let mut s = Scenario::seller(config(Direction::QuoteVenueSells)).await;
    let placed_at = Utc::now();
    let order_id = s.resting_sell(placed_at).await;

    let later = placed_at + ChronoDuration::seconds(11);
    s.tick(dec!(100.01), later).await;
    s.drain(later).await;

    let cancelled = EngineEvent::Order {
        venue: VenueRole::Quote,
        update: OrderUpdate::Cancelled {
            order_id: order_id.clone(),
        },
    };
    s.engine.handle_at(cancelled, later).await.unwrap();

    assert_eq!(s.engine.state(), EngineState::Idle);
    assert!(s.engine.active_orders().is_empty());
    assert_eq!(s.engine.stats().reconciliations, 0);
}

#[tokio::test]
async fn test_second_intent_ignored_while_cancelling() {
    let quote = paper(
        VenueRole::Quote,
        dec!(2),
        dec!(0),
        PaperVenueConfig {
            confirm_cancels: false,
            ..PaperVenueConfig::default()
        },
    );
    let reference = paper(
        VenueRole::Reference,
        dec!(0),
        dec!(1000),
        PaperVenueConfig::default(),
    );
    let mut s = Scenario::new(config(Direction::QuoteVenueSells), quote, reference).await;
    let placed_at = Utc::now();
    s.resting_sell(placed_at).await;

    let later = placed_at + ChronoDuration::seconds(11);
    s.tick(dec!(100.01), later).await;
    s.tick(dec!(99.00), later).await;
    s.drain(later).await;

    assert_eq!(s.engine.state(), EngineState::Cancelling);
    let activity = s.quote.activity().await;
    assert_eq!(activity.cancels.len(), 1);
    assert_eq!(activity.limit_orders.len(), 1);
}

// ==================== Runner with replay ====================

#[tokio::test]
async fn test_replay_drives_quote_fill_and_hedge() {
    let mut config = AppConfig::default_config(true);
    config.market_data.reference_price = ReferencePriceMode::LastTrade;
    config.recovery.warmup_ms = 20;
    config.recovery.cancel_grace_ms = 1;
    config.recovery.restart_interval_secs = 0;
    config.paper.simulate_fills = true;
    config
        .paper
        .quote_balances
        .extend([("sol".to_string(), dec!(3)), ("usdt".to_string(), dec!(50))]);
    config
        .paper
        .reference_balances
        .extend([("sol".to_string(), dec!(0)), ("usdt".to_string(), dec!(1000))]);

    let venues = build_paper_venues(&config).unwrap();
    let mut runner = EngineRunner::new(
        config,
        venues.quote_client(),
        venues.reference_client(),
    );

    let feed = ReplayFeed::parse(
        r#"
{"type":"book_snapshot","venue":"quote","bids":[{"price":"100.00","volume":"2"}],"asks":[{"price":"100.25","volume":"2"}]}
{"type":"book_snapshot","venue":"reference","bids":[{"price":"99.99","volume":"5"}],"asks":[{"price":"100.01","volume":"5"}]}
{"type":"trade","venue":"reference","price":"100.00","volume":"0.2"}
{"delay_ms":150,"type":"trade","venue":"quote","price":"100.24","volume":"3"}
"#,
    )
    .unwrap()
    .with_venue(venues.quote.clone())
    .with_venue(venues.reference.clone())
    .with_shutdown_at_end(true);

    let sink = runner.sink();
    let replay = tokio::spawn(async move { feed.run(sink).await });

    runner.start().await.unwrap();
    assert_eq!(runner.engine().direction(), Some(Direction::QuoteVenueSells));

    let stats = runner.run().await.unwrap();
    assert_eq!(replay.await.unwrap(), 4);

    assert_eq!(stats.placements, 1);
    assert_eq!(stats.fills, 1);
    assert_eq!(stats.hedges, 1);

    let hedges = venues.reference.activity().await.market_orders;
    assert_eq!(hedges.len(), 1);
    assert_eq!(hedges[0].side, OrderSide::Buy);
    assert_eq!(hedges[0].volume, dec!(3));
    assert!(venues.quote.resting_orders().await.is_empty());
}
