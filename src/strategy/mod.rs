//! Quoting, hedging and recovery for one venue pair
//!
//! ## Flow
//!
//! - `direction` picks which venue sells the base asset
//! - `pricing` turns the reference price, quote-venue book and balances into a quote
//! - `engine` sequences placement, cancellation and fills, one intent at a time
//! - `hedge` offsets every fill on the reference venue
//! - `reconciliation` tears down and rebuilds when local state is unreliable
//! - `runner` owns the engine and drains its event queue

pub mod direction;
pub mod engine;
pub mod hedge;
pub mod identity;
pub mod pricing;
pub mod reconciliation;
pub mod runner;
pub mod timers;

pub use direction::determine_direction;
pub use engine::{EngineStats, PendingPlacement, XemmEngine};
pub use hedge::{HedgeBook, PendingHedge};
pub use identity::{BoundedIdSet, IdentitySets};
pub use pricing::{ceil_to_tick, floor_to_tick, CancelReason, Pricer, Quote};
pub use runner::EngineRunner;
pub use timers::TimerScheduler;
