use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::engine::XemmEngine;
use crate::domain::{OrderRequest, OrderSide, OrderUpdate, RecoveryTrigger, TimerEvent, VenueRole};
use crate::error::Result;
use crate::exchange::with_timeout;

/// Market order sent to the reference venue to offset a fill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHedge {
    pub hedge_id: String,
    pub source_order_id: String,
    pub side: OrderSide,
    pub volume: Decimal,
    pub submitted_at: DateTime<Utc>,
}

impl PendingHedge {
    /// Signed change the hedge makes to the reference-venue base total
    pub fn base_delta(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.volume,
            OrderSide::Sell => -self.volume,
        }
    }
}

/// Hedges submitted and not yet confirmed by the reference venue.
///
/// A balance push confirms hedges only once the reference base total has moved from the
/// baseline by the cumulative volume they should have traded, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HedgeBook {
    /// Submission order
    pending: Vec<PendingHedge>,
    /// Reference base total before the current run of hedges
    baseline: Option<Decimal>,
    /// Base movement owed by hedges since the baseline that were confirmed by order push
    settled_since_baseline: Decimal,
    confirmed: u64,
    hedged_volume: Decimal,
}

fn covers(moved: Decimal, expected: Decimal) -> bool {
    if expected < Decimal::ZERO {
        moved <= expected
    } else {
        moved >= expected
    }
}

impl HedgeBook {
    /// Track a submitted hedge; `base_total` is the reference base total seen before it
    pub fn track(&mut self, hedge: PendingHedge, base_total: Option<Decimal>) {
        if self.baseline.is_none() {
            self.baseline = base_total;
            self.settled_since_baseline = Decimal::ZERO;
        }
        self.hedged_volume += hedge.volume;
        self.pending.push(hedge);
    }

    pub fn confirm(&mut self, hedge_id: &str) -> Option<PendingHedge> {
        let index = self.pending.iter().position(|h| h.hedge_id == hedge_id)?;
        let hedge = self.pending.remove(index);
        if self.baseline.is_some() {
            self.settled_since_baseline += hedge.base_delta();
        }
        self.confirmed += 1;
        Some(hedge)
    }

    /// Confirm the oldest hedges the reference base total accounts for
    pub fn confirm_by_balance(&mut self, base_total: Decimal) -> Vec<PendingHedge> {
        let Some(baseline) = self.baseline else {
            return Vec::new();
        };
        let moved = base_total - baseline;

        let mut expected = self.settled_since_baseline;
        let mut covered = 0;
        for hedge in &self.pending {
            expected += hedge.base_delta();
            if !covers(moved, expected) {
                break;
            }
            covered += 1;
        }

        let settled: Vec<PendingHedge> = self.pending.drain(..covered).collect();
        self.confirmed += settled.len() as u64;
        if !settled.is_empty() {
            self.settled_since_baseline += settled.iter().map(|h| h.base_delta()).sum::<Decimal>();
        }

        // Every hedge since the baseline is reflected; the next one starts a fresh run
        if self.pending.is_empty() && covers(moved, self.settled_since_baseline) {
            self.baseline = None;
            self.settled_since_baseline = Decimal::ZERO;
        }
        settled
    }

    /// Forget every unconfirmed hedge; returns them
    pub fn reset(&mut self) -> Vec<PendingHedge> {
        self.baseline = None;
        self.settled_since_baseline = Decimal::ZERO;
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self, hedge_id: &str) -> bool {
        self.pending.iter().any(|h| h.hedge_id == hedge_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed
    }

    /// Total volume sent to the reference venue
    pub fn hedged_volume(&self) -> Decimal {
        self.hedged_volume
    }
}

impl XemmEngine {
    /// Offset a fill with a market order on the reference venue.
    ///
    /// A failed submission leaves an unhedged position, so it goes straight to
    /// reconciliation.
    pub(crate) async fn submit_hedge(
        &mut self,
        source_order_id: &str,
        side: OrderSide,
        volume: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        info!(
            "Hedging {} {} on {} for order {}",
            side, volume, self.config.reference_venue.name, source_order_id
        );

        let base_total = self.reference_base_total();
        let request = OrderRequest::market(side, volume);
        let submitted = with_timeout(
            VenueRole::Reference,
            self.config.execution.request_timeout(),
            self.reference.place_order(&request),
        )
        .await;

        match submitted {
            Ok(handle) => {
                self.stats.hedges += 1;
                self.hedges.track(
                    PendingHedge {
                        hedge_id: handle.id.clone(),
                        source_order_id: source_order_id.to_string(),
                        side,
                        volume,
                        submitted_at: now,
                    },
                    base_total,
                );
                self.timers.arm(
                    self.config.execution.hedge_timeout(),
                    TimerEvent::HedgeTimeout {
                        hedge_id: handle.id,
                    },
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Hedge {} {} for order {} failed: {}",
                    side, volume, source_order_id, e
                );
                self.restart(RecoveryTrigger::HedgeAnomaly).await
            }
        }
    }

    /// Reference-venue order pushes confirm (or break) hedges
    pub(crate) async fn on_hedge_update(&mut self, update: OrderUpdate) -> Result<()> {
        match update {
            OrderUpdate::Filled { order_id, .. } | OrderUpdate::Confirmed { order_id, .. } => {
                match self.hedges.confirm(&order_id) {
                    Some(hedge) => info!(
                        "Hedge {} confirmed ({} {} for order {})",
                        hedge.hedge_id, hedge.side, hedge.volume, hedge.source_order_id
                    ),
                    None => debug!("Reference venue update for {} not a pending hedge", order_id),
                }
                Ok(())
            }
            OrderUpdate::Cancelled { order_id } => {
                if !self.hedges.is_pending(&order_id) {
                    return Ok(());
                }
                warn!("Hedge {} cancelled by the reference venue", order_id);
                self.restart(RecoveryTrigger::HedgeAnomaly).await
            }
        }
    }

    fn reference_base_total(&self) -> Option<Decimal> {
        self.balances
            .total(VenueRole::Reference, &self.config.pair.base)
            .ok()
    }

    /// Settle hedges the latest reference base total accounts for
    pub(crate) fn confirm_hedges_by_balance(&mut self) {
        let Some(base_total) = self.reference_base_total() else {
            return;
        };
        let settled = self.hedges.confirm_by_balance(base_total);
        if !settled.is_empty() {
            info!(
                "{} hedge(s) confirmed by reference balance ({} {})",
                settled.len(),
                base_total,
                self.config.pair.base
            );
        }
    }
}
