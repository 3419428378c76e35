use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::PriceLevel;
use crate::error::{Result, XemmError};

/// Local copy of one venue's order book, truncated to a fixed depth per side
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    depth: usize,
    initialized: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl OrderBook {
    pub fn new(depth: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            depth: depth.max(1),
            initialized: false,
            updated_at: None,
        }
    }

    /// Replace both sides
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.clear();
        self.asks.clear();
        upsert_levels(&mut self.bids, bids);
        upsert_levels(&mut self.asks, asks);
        self.initialized = true;
        self.truncate();
        self.updated_at = Some(Utc::now());
    }

    /// Apply an incremental update; returns false when no snapshot has been seen yet
    pub fn apply_delta(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) -> bool {
        if !self.initialized {
            return false;
        }

        upsert_levels(&mut self.bids, bids);
        upsert_levels(&mut self.asks, asks);
        self.truncate();
        self.updated_at = Some(Utc::now());
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn best_bid(&self) -> Result<Decimal> {
        self.top_bid().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Result<Decimal> {
        self.top_ask().map(|level| level.price)
    }

    pub fn best_bid_volume(&self) -> Result<Decimal> {
        self.top_bid().map(|level| level.volume)
    }

    pub fn best_ask_volume(&self) -> Result<Decimal> {
        self.top_ask().map(|level| level.volume)
    }

    pub fn mid(&self) -> Result<Decimal> {
        Ok((self.best_bid()? + self.best_ask()?) / Decimal::TWO)
    }

    /// Bid levels, best (highest) first
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids
            .iter()
            .rev()
            .map(|(price, volume)| PriceLevel::new(*price, *volume))
    }

    /// Ask levels, best (lowest) first
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks
            .iter()
            .map(|(price, volume)| PriceLevel::new(*price, *volume))
    }

    fn top_bid(&self) -> Result<PriceLevel> {
        self.bids()
            .next()
            .ok_or_else(|| XemmError::NotAvailable("no bids in book".to_string()))
    }

    fn top_ask(&self) -> Result<PriceLevel> {
        self.asks()
            .next()
            .ok_or_else(|| XemmError::NotAvailable("no asks in book".to_string()))
    }

    fn truncate(&mut self) {
        while self.bids.len() > self.depth {
            // Worst bid is the lowest price
            if self.bids.pop_first().is_none() {
                break;
            }
        }
        while self.asks.len() > self.depth {
            if self.asks.pop_last().is_none() {
                break;
            }
        }
    }
}

fn upsert_levels(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel]) {
    for level in levels {
        if level.volume.is_zero() {
            side.remove(&level.price);
        } else {
            side.insert(level.price, level.volume);
        }
    }
}
