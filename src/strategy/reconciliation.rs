//! Full teardown and rebuild when local state can no longer be trusted.
//!
//! Safe to run from any state and to run again while a previous attempt left the engine
//! suspended.

use tracing::{info, warn};

use super::direction::determine_direction;
use super::engine::XemmEngine;
use crate::config::DirectionMode;
use crate::domain::{EngineState, OrderSide, RecoveryTrigger, VenueRole};
use crate::error::Result;
use crate::exchange::with_timeout;

impl XemmEngine {
    pub(crate) async fn reconcile(&mut self, trigger: RecoveryTrigger) -> Result<()> {
        warn!(trigger = %trigger, state = %self.state, "reconciliation started");
        self.stats.reconciliations += 1;
        if trigger.requests_reversal() {
            self.reversal_requested = true;
        }

        self.transition(EngineState::Suspended, format!("reconcile: {}", trigger))?;

        let side = self.direction.map(|d| d.resting_side());
        self.cancel_resting(side).await;
        tokio::time::sleep(self.config.recovery.cancel_grace()).await;
        // Second sweep catches placements that landed during the first
        self.cancel_resting(side).await;

        self.clear_order_state();

        self.close_venues().await;
        self.connect_venues().await?;
        self.refresh_balances().await?;

        let unverified = self.hedges.reset();
        if !unverified.is_empty() {
            warn!(
                "{} hedge(s) unverified at reconciliation: {:?}",
                unverified.len(),
                unverified.iter().map(|h| h.hedge_id.as_str()).collect::<Vec<_>>()
            );
        }

        self.settle_direction();
        self.transition(EngineState::Idle, format!("reconciled after {}", trigger))?;
        info!(
            "Reconciliation ({}) complete, direction {}",
            trigger,
            self.direction
                .map(|d| d.to_string())
                .unwrap_or_else(|| "undecided".to_string())
        );
        Ok(())
    }

    /// Best-effort bulk cancel on the quote venue; both sides when the direction is unknown
    pub(crate) async fn cancel_resting(&mut self, side: Option<OrderSide>) {
        let sides = match side {
            Some(side) => vec![side],
            None => vec![OrderSide::Buy, OrderSide::Sell],
        };

        for side in sides {
            let result = with_timeout(
                VenueRole::Quote,
                self.config.execution.request_timeout(),
                self.quote.cancel_all(side),
            )
            .await;
            if let Err(e) = result {
                warn!("Cancel-all {} on quote venue failed: {}", side, e);
            }
        }
    }

    pub(crate) async fn close_venues(&mut self) {
        if let Err(e) = self.quote.close().await {
            warn!("Closing quote venue failed: {}", e);
        }
        if let Err(e) = self.reference.close().await {
            warn!("Closing reference venue failed: {}", e);
        }
    }

    pub(crate) async fn connect_venues(&mut self) -> Result<()> {
        let timeout = self.config.execution.request_timeout();
        with_timeout(VenueRole::Quote, timeout, self.quote.connect(self.sink.clone())).await?;
        with_timeout(
            VenueRole::Reference,
            timeout,
            self.reference.connect(self.sink.clone()),
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn refresh_balances(&mut self) -> Result<()> {
        let timeout = self.config.execution.request_timeout();

        let quote = with_timeout(VenueRole::Quote, timeout, self.quote.get_balances()).await?;
        self.balances.replace(VenueRole::Quote, &quote);

        let reference =
            with_timeout(VenueRole::Reference, timeout, self.reference.get_balances()).await?;
        self.balances.replace(VenueRole::Reference, &reference);

        self.confirm_hedges_by_balance();
        Ok(())
    }

    /// Flip on exhaustion, otherwise re-derive from inventory when configured to
    fn settle_direction(&mut self) {
        if self.reversal_requested {
            self.reversal_requested = false;
            if let Some(current) = self.direction {
                let reversed = current.reversed();
                info!("Reversing direction: {} -> {}", current, reversed);
                self.direction = Some(reversed);
                self.stats.reversals += 1;
            }
            return;
        }

        if self.config.strategy.direction_mode != DirectionMode::Inventory {
            return;
        }

        match determine_direction(&self.config, &self.market, &self.balances) {
            Ok(direction) => {
                if self.direction != Some(direction) {
                    info!(
                        "Direction re-derived: {:?} -> {}",
                        self.direction, direction
                    );
                }
                self.direction = Some(direction);
            }
            Err(e) => warn!(
                "Could not re-derive direction ({}); keeping {:?}",
                e, self.direction
            ),
        }
    }
}
