pub mod balances;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod market_data;
pub mod strategy;

pub use balances::BalanceTracker;
pub use config::AppConfig;
pub use domain::{Direction, EngineEvent, EngineState, OrderSide, RecoveryTrigger, VenueRole};
pub use error::{Result, XemmError};
pub use exchange::{build_paper_venues, EventSink, PaperVenue, PaperVenues, VenueClient};
pub use feed::ReplayFeed;
pub use market_data::{MarketDataView, OrderBook, ReferencePrice};
pub use strategy::{EngineRunner, EngineStats, XemmEngine};
