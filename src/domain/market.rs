use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::OrderSide;

/// Role a venue plays in the venue pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueRole {
    /// Venue where resting limit orders capture the spread
    Quote,
    /// Venue whose price is the signal and which absorbs hedges
    Reference,
}

impl VenueRole {
    /// Get the counter venue
    pub fn counter(&self) -> Self {
        match self {
            VenueRole::Quote => VenueRole::Reference,
            VenueRole::Reference => VenueRole::Quote,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueRole::Quote => "quote venue",
            VenueRole::Reference => "reference venue",
        }
    }
}

impl std::fmt::Display for VenueRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which venue currently sells the base asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Quote venue rests asks, reference venue buys back
    QuoteVenueSells,
    /// Quote venue rests bids, reference venue sells
    ReferenceVenueSells,
}

impl Direction {
    pub fn selling_venue(&self) -> VenueRole {
        match self {
            Direction::QuoteVenueSells => VenueRole::Quote,
            Direction::ReferenceVenueSells => VenueRole::Reference,
        }
    }

    /// Side of the resting order on the quote venue
    pub fn resting_side(&self) -> OrderSide {
        match self {
            Direction::QuoteVenueSells => OrderSide::Sell,
            Direction::ReferenceVenueSells => OrderSide::Buy,
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            Direction::QuoteVenueSells => Direction::ReferenceVenueSells,
            Direction::ReferenceVenueSells => Direction::QuoteVenueSells,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::QuoteVenueSells => "quote_venue_sells",
            Direction::ReferenceVenueSells => "reference_venue_sells",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quote_venue_sells" | "quote" => Ok(Direction::QuoteVenueSells),
            "reference_venue_sells" | "reference" => Ok(Direction::ReferenceVenueSells),
            _ => Err("invalid direction; expected quote_venue_sells|reference_venue_sells"),
        }
    }
}

/// One price level of an order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Currency balance on one venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn new(available: Decimal, locked: Decimal) -> Self {
        Self { available, locked }
    }

    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}

/// Full replace of one currency's balance, as pushed or pulled from a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub currency: String,
    pub available: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}
