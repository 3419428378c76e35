use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::OrderBook;
use crate::config::{MarketDataConfig, ReferencePriceMode};
use crate::error::{Result, XemmError};

/// Decimal places kept on the smoothed price, so tiny float noise does not register as a tick
const REFERENCE_PRICE_DP: u32 = 8;

/// How the reference price is derived from the reference venue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceSource {
    LastTrade,
    DecayedMid { levels: usize, lambda: f64 },
}

impl From<&MarketDataConfig> for ReferenceSource {
    fn from(config: &MarketDataConfig) -> Self {
        match config.reference_price {
            ReferencePriceMode::LastTrade => ReferenceSource::LastTrade,
            ReferencePriceMode::DecayedMid => ReferenceSource::DecayedMid {
                levels: config.decay_levels,
                lambda: config.decay_lambda,
            },
        }
    }
}

/// Reference price. Every reference trade ticks in last-trade mode, so order age is
/// re-checked even in a flat market; the book-derived mid ticks only when it moves.
#[derive(Debug, Clone)]
pub struct ReferencePrice {
    source: ReferenceSource,
    current: Option<Decimal>,
}

impl ReferencePrice {
    pub fn new(source: ReferenceSource) -> Self {
        Self {
            source,
            current: None,
        }
    }

    pub fn source(&self) -> ReferenceSource {
        self.source
    }

    pub fn current(&self) -> Result<Decimal> {
        self.current
            .ok_or_else(|| XemmError::NotAvailable("reference price not yet observed".to_string()))
    }

    /// Feed a reference-venue trade
    pub fn on_trade(&mut self, price: Decimal) -> Option<Decimal> {
        match self.source {
            ReferenceSource::LastTrade => {
                self.current = Some(price);
                Some(price)
            }
            ReferenceSource::DecayedMid { .. } => None,
        }
    }

    /// Feed the reference-venue book after an update
    pub fn on_book(&mut self, book: &OrderBook) -> Option<Decimal> {
        match self.source {
            ReferenceSource::LastTrade => None,
            ReferenceSource::DecayedMid { levels, lambda } => {
                let price = decayed_mid(book, levels, lambda)?;
                self.update(price)
            }
        }
    }

    fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if self.current == Some(price) {
            return None;
        }
        self.current = Some(price);
        Some(price)
    }
}

/// Exponentially decayed, volume-weighted mid over the top `levels` of the book.
///
/// Level i contributes `(bid*bidVol + ask*askVol) / (bidVol + askVol)` with weight
/// `exp(-lambda * i)`. Only levels present on both sides are used.
pub fn decayed_mid(book: &OrderBook, levels: usize, lambda: f64) -> Option<Decimal> {
    let mut weighted = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;

    for (i, (bid, ask)) in book.bids().zip(book.asks()).take(levels).enumerate() {
        let volume = bid.volume + ask.volume;
        if volume.is_zero() {
            continue;
        }
        let level_price = (bid.price * bid.volume + ask.price * ask.volume) / volume;
        let weight = Decimal::from_f64((-lambda * i as f64).exp())?;

        weighted += level_price * weight;
        total_weight += weight;
    }

    if total_weight.is_zero() {
        return None;
    }

    Some((weighted / total_weight).round_dp(REFERENCE_PRICE_DP))
}
