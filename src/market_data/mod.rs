//! Per-venue order books and the smoothed reference price

mod order_book;
mod reference;

pub use order_book::OrderBook;
pub use reference::{decayed_mid, ReferencePrice, ReferenceSource};

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::domain::{EngineEvent, VenueRole};
use crate::error::Result;

/// Market state the engine reads synchronously
#[derive(Debug, Clone)]
pub struct MarketDataView {
    quote_book: OrderBook,
    reference_book: OrderBook,
    reference_price: ReferencePrice,
}

impl MarketDataView {
    pub fn new(config: &MarketDataConfig) -> Self {
        Self {
            quote_book: OrderBook::new(config.book_depth),
            reference_book: OrderBook::new(config.book_depth),
            reference_price: ReferencePrice::new(ReferenceSource::from(config)),
        }
    }

    pub fn book(&self, venue: VenueRole) -> &OrderBook {
        match venue {
            VenueRole::Quote => &self.quote_book,
            VenueRole::Reference => &self.reference_book,
        }
    }

    fn book_mut(&mut self, venue: VenueRole) -> &mut OrderBook {
        match venue {
            VenueRole::Quote => &mut self.quote_book,
            VenueRole::Reference => &mut self.reference_book,
        }
    }

    pub fn reference_price(&self) -> Result<Decimal> {
        self.reference_price.current()
    }

    /// Apply a market event; returns the reference price when the event produced a tick
    pub fn apply(&mut self, event: &EngineEvent) -> Option<Decimal> {
        match event {
            EngineEvent::BookSnapshot { venue, bids, asks } => {
                self.book_mut(*venue).apply_snapshot(bids, asks);
                self.after_book_update(*venue)
            }
            EngineEvent::BookDelta { venue, bids, asks } => {
                if !self.book_mut(*venue).apply_delta(bids, asks) {
                    debug!("Ignoring {} book delta before first snapshot", venue);
                    return None;
                }
                self.after_book_update(*venue)
            }
            EngineEvent::Trade { venue, price, .. } if *venue == VenueRole::Reference => {
                self.reference_price.on_trade(*price)
            }
            _ => None,
        }
    }

    fn after_book_update(&mut self, venue: VenueRole) -> Option<Decimal> {
        match venue {
            VenueRole::Reference => self.reference_price.on_book(&self.reference_book),
            VenueRole::Quote => None,
        }
    }
}
