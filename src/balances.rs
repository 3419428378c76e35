use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{Balance, BalanceUpdate, VenueRole};
use crate::error::{Result, XemmError};

/// Last-write cache of per-venue, per-currency balances
#[derive(Debug, Clone, Default)]
pub struct BalanceTracker {
    balances: HashMap<(VenueRole, String), Balance>,
}

impl BalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply pushed updates; each currency is replaced wholesale
    pub fn apply(&mut self, venue: VenueRole, updates: &[BalanceUpdate]) {
        for update in updates {
            self.set(
                venue,
                &update.currency,
                Balance::new(update.available, update.locked),
            );
        }
    }

    /// Apply a pulled snapshot
    pub fn replace(&mut self, venue: VenueRole, balances: &HashMap<String, Balance>) {
        for (currency, balance) in balances {
            self.set(venue, currency, *balance);
        }
    }

    pub fn set(&mut self, venue: VenueRole, currency: &str, balance: Balance) {
        self.balances
            .insert((venue, currency.to_ascii_lowercase()), balance);
    }

    pub fn balance(&self, venue: VenueRole, currency: &str) -> Result<Balance> {
        self.balances
            .get(&(venue, currency.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| XemmError::BalanceUnknown {
                venue,
                currency: currency.to_ascii_lowercase(),
            })
    }

    pub fn available(&self, venue: VenueRole, currency: &str) -> Result<Decimal> {
        self.balance(venue, currency).map(|b| b.available)
    }

    pub fn total(&self, venue: VenueRole, currency: &str) -> Result<Decimal> {
        self.balance(venue, currency).map(|b| b.total())
    }

    pub fn has_venue(&self, venue: VenueRole) -> bool {
        self.balances.keys().any(|(v, _)| *v == venue)
    }
}
