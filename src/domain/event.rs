use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BalanceUpdate, OrderSide, PriceLevel, VenueRole};

/// Everything the engine reacts to, drained from one queue in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Full order book replace
    BookSnapshot {
        venue: VenueRole,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
    /// Incremental book update; zero volume removes a level
    BookDelta {
        venue: VenueRole,
        #[serde(default)]
        bids: Vec<PriceLevel>,
        #[serde(default)]
        asks: Vec<PriceLevel>,
    },
    /// Public trade tick
    Trade {
        venue: VenueRole,
        price: Decimal,
        volume: Decimal,
    },
    /// Per-currency balance replace
    Balances {
        venue: VenueRole,
        balances: Vec<BalanceUpdate>,
    },
    /// This account's order lifecycle
    Order {
        venue: VenueRole,
        update: OrderUpdate,
    },
    /// Compensating timer fired
    Timer(TimerEvent),
    /// Reconciliation requested from outside the engine
    Restart { trigger: RecoveryTrigger },
    Shutdown,
}

/// Order lifecycle push from a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderUpdate {
    /// Order is resting on the book
    Confirmed {
        order_id: String,
        side: OrderSide,
        price: Option<Decimal>,
        volume: Decimal,
        remaining: Decimal,
    },
    /// Order left the book without (further) fills
    Cancelled { order_id: String },
    /// A trade executed against the order
    Filled {
        order_id: String,
        trade_id: String,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
    },
}

impl OrderUpdate {
    pub fn order_id(&self) -> &str {
        match self {
            OrderUpdate::Confirmed { order_id, .. }
            | OrderUpdate::Cancelled { order_id }
            | OrderUpdate::Filled { order_id, .. } => order_id,
        }
    }
}

/// Timer paired with a mutating intent; carries the intent identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "timer", rename_all = "snake_case")]
pub enum TimerEvent {
    PlacementTimeout { intent_id: Uuid },
    CancelTimeout { intent_id: Uuid, order_id: String },
    HedgeTimeout { hedge_id: String },
}

/// Why reconciliation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrigger {
    PlacementTimeout,
    CancelTimeout,
    InsufficientBalance,
    VenueError,
    HedgeAnomaly,
    Periodic,
    External,
    Retry,
}

impl RecoveryTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTrigger::PlacementTimeout => "placement_timeout",
            RecoveryTrigger::CancelTimeout => "cancel_timeout",
            RecoveryTrigger::InsufficientBalance => "insufficient_balance",
            RecoveryTrigger::VenueError => "venue_error",
            RecoveryTrigger::HedgeAnomaly => "hedge_anomaly",
            RecoveryTrigger::Periodic => "periodic",
            RecoveryTrigger::External => "external",
            RecoveryTrigger::Retry => "retry",
        }
    }

    /// Inventory exhaustion flips the direction instead of re-deriving it
    pub fn requests_reversal(&self) -> bool {
        matches!(self, RecoveryTrigger::InsufficientBalance)
    }
}

impl std::fmt::Display for RecoveryTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
