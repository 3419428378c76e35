use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Placement requested, venue has not confirmed yet
    Pending,
    /// Resting on the book
    Open,
    /// Resting with part of the volume filled
    PartiallyFilled,
    /// Cancel issued, waiting for confirmation
    Cancelling,
    /// Fully filled
    Filled,
    /// Cancel confirmed (or assumed by reconciliation)
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Open | OrderStatus::PartiallyFilled | OrderStatus::Cancelling
        )
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// None for market orders
    pub price: Option<Decimal>,
    pub volume: Decimal,
}

impl OrderRequest {
    pub fn limit(side: OrderSide, price: Decimal, volume: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            volume,
        }
    }

    pub fn market(side: OrderSide, volume: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            side,
            order_type: OrderType::Market,
            price: None,
            volume,
        }
    }
}

/// Venue acknowledgement of a placement request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
    pub client_order_id: String,
    pub side: OrderSide,
    pub price: Option<Decimal>,
    pub volume: Decimal,
}

/// Result of applying a fill notification to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Trade id already applied, nothing changed
    Duplicate,
    /// Volume applied, order still resting
    Partial { filled: Decimal, remaining: Decimal },
    /// Volume applied, nothing remains
    Complete { filled: Decimal },
}

/// Resting order on the quote venue (tracked in our system)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub volume: Decimal,
    pub remaining: Decimal,
    pub placed_at: DateTime<Utc>,
    pub status: OrderStatus,
    #[serde(skip)]
    applied_trades: HashSet<String>,
}

impl Order {
    /// Provisional order created from a placement acknowledgement
    pub fn from_handle(handle: &OrderHandle, price: Decimal, placed_at: DateTime<Utc>) -> Self {
        Self {
            id: handle.id.clone(),
            side: handle.side,
            price: handle.price.unwrap_or(price),
            volume: handle.volume,
            remaining: handle.volume,
            placed_at,
            status: OrderStatus::Pending,
            applied_trades: HashSet::new(),
        }
    }

    pub fn confirm(&mut self) {
        if self.status == OrderStatus::Pending {
            self.status = if self.remaining < self.volume {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            };
        }
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.placed_at).num_milliseconds()
    }

    pub fn filled(&self) -> Decimal {
        self.volume - self.remaining
    }

    /// Apply a trade against this order, keyed by the venue trade id.
    ///
    /// Remaining volume never goes below zero; the reported volume is returned
    /// untouched because that is what actually traded and needs hedging.
    pub fn apply_fill(&mut self, trade_id: &str, volume: Decimal) -> FillOutcome {
        if !self.applied_trades.insert(trade_id.to_string()) {
            return FillOutcome::Duplicate;
        }

        self.remaining = (self.remaining - volume).max(Decimal::ZERO);

        if self.remaining.is_zero() {
            self.status = OrderStatus::Filled;
            FillOutcome::Complete { filled: volume }
        } else {
            if self.status != OrderStatus::Cancelling {
                self.status = OrderStatus::PartiallyFilled;
            }
            FillOutcome::Partial {
                filled: volume,
                remaining: self.remaining,
            }
        }
    }
}
