use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::direction::determine_direction;
use super::hedge::HedgeBook;
use super::identity::IdentitySets;
use super::pricing::{CancelReason, Pricer};
use super::timers::TimerScheduler;
use crate::balances::BalanceTracker;
use crate::config::AppConfig;
use crate::domain::{
    BalanceUpdate, Direction, EngineEvent, EngineState, FillOutcome, Order, OrderRequest,
    OrderSide, OrderStatus, OrderUpdate, RecoveryTrigger, StateTransition, TimerEvent, VenueRole,
};
use crate::error::{Result, XemmError};
use crate::exchange::{with_timeout, EventSink, VenueClient};
use crate::market_data::MarketDataView;

/// State transitions kept for inspection
const TRANSITION_HISTORY: usize = 256;

/// Placement submitted and acknowledged, waiting for the venue push
#[derive(Debug, Clone)]
pub struct PendingPlacement {
    pub intent_id: Uuid,
    pub order: Order,
}

/// Running counters, logged on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub placements: u64,
    pub cancels: u64,
    pub fills: u64,
    pub hedges: u64,
    pub reconciliations: u64,
    pub reversals: u64,
}

/// Execution state machine for one venue pair.
///
/// Owned by a single task; every event is applied to completion (venue calls included)
/// before the next one is read, so the state is never observed mid-transition.
pub struct XemmEngine {
    pub(crate) config: AppConfig,
    pub(crate) pricer: Pricer,
    pub(crate) state: EngineState,
    pub(crate) direction: Option<Direction>,
    pub(crate) reversal_requested: bool,
    pub(crate) market: MarketDataView,
    pub(crate) balances: BalanceTracker,
    pub(crate) orders: HashMap<String, Order>,
    pub(crate) pending: Option<PendingPlacement>,
    /// Order id -> intent id of the cancel in flight
    pub(crate) cancelling: HashMap<String, Uuid>,
    pub(crate) identity: IdentitySets,
    pub(crate) hedges: HedgeBook,
    pub(crate) quote: Arc<dyn VenueClient>,
    pub(crate) reference: Arc<dyn VenueClient>,
    pub(crate) sink: EventSink,
    pub(crate) timers: TimerScheduler,
    pub(crate) history: VecDeque<StateTransition>,
    pub(crate) stats: EngineStats,
    pub(crate) stopped: bool,
}

impl XemmEngine {
    pub fn new(
        config: AppConfig,
        quote: Arc<dyn VenueClient>,
        reference: Arc<dyn VenueClient>,
        sink: EventSink,
    ) -> Self {
        Self {
            pricer: Pricer::from_config(&config),
            market: MarketDataView::new(&config.market_data),
            config,
            // Nothing trades until a direction is chosen
            state: EngineState::Suspended,
            direction: None,
            reversal_requested: false,
            balances: BalanceTracker::new(),
            orders: HashMap::new(),
            pending: None,
            cancelling: HashMap::new(),
            identity: IdentitySets::default(),
            hedges: HedgeBook::default(),
            quote,
            reference,
            timers: TimerScheduler::new(sink.clone()),
            sink,
            history: VecDeque::new(),
            stats: EngineStats::default(),
            stopped: false,
        }
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn market(&self) -> &MarketDataView {
        &self.market
    }

    pub fn balances(&self) -> &BalanceTracker {
        &self.balances
    }

    pub fn active_orders(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.values().collect();
        orders.sort_by_key(|order| order.placed_at);
        orders
    }

    pub fn active_order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn pending_placement(&self) -> Option<&PendingPlacement> {
        self.pending.as_ref()
    }

    /// Intent id of the cancel outstanding for an order
    pub fn cancel_intent(&self, order_id: &str) -> Option<Uuid> {
        self.cancelling.get(order_id).copied()
    }

    pub fn hedges(&self) -> &HedgeBook {
        &self.hedges
    }

    pub fn identity(&self) -> &IdentitySets {
        &self.identity
    }

    pub fn transitions(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    // ==================== Lifecycle ====================

    /// Connect both venues and pull starting balances
    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting engine for {} (quote venue {}, reference venue {})",
            self.config.pair.symbol(),
            self.config.quote_venue.name,
            self.config.reference_venue.name
        );
        self.connect_venues().await?;
        self.refresh_balances().await?;
        Ok(())
    }

    /// Pick the starting direction once books and balances are populated
    pub fn activate(&mut self) -> Result<Direction> {
        let direction = determine_direction(&self.config, &self.market, &self.balances)?;
        self.direction = Some(direction);
        if self.state != EngineState::Idle {
            self.transition(EngineState::Idle, format!("activated, {}", direction))?;
        }
        Ok(direction)
    }

    /// Run one evaluation against the latest reference price, if any
    pub async fn evaluate(&mut self, now: DateTime<Utc>) -> Result<()> {
        let result = match self.market.reference_price() {
            Ok(price) => self.on_reference_tick(price, now).await,
            Err(_) => Ok(()),
        };
        self.recover_from(result).await
    }

    /// Cancel resting orders and close both venues
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        info!("Stopping engine");
        self.transition(EngineState::Suspended, "shutdown")?;

        let side = self.direction.map(|d| d.resting_side());
        self.cancel_resting(side).await;
        self.clear_order_state();
        self.close_venues().await;
        self.stopped = true;

        info!(
            "Engine stopped: {} placements, {} cancels, {} fills, {} hedges, {} reconciliations, {} reversals",
            self.stats.placements,
            self.stats.cancels,
            self.stats.fills,
            self.stats.hedges,
            self.stats.reconciliations,
            self.stats.reversals
        );
        Ok(())
    }

    /// Run reconciliation, then quote again at once; a failed rebuild is retried after
    /// the backoff
    pub async fn restart(&mut self, trigger: RecoveryTrigger) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        let backoff = self.config.recovery.retry_backoff();
        if let Err(e) = self.reconcile(trigger).await {
            warn!(
                "Reconciliation ({}) failed: {}; retrying in {}ms",
                trigger,
                e,
                backoff.as_millis()
            );
            self.timers.arm_restart(backoff, RecoveryTrigger::Retry);
            return Ok(());
        }

        let Ok(reference) = self.market.reference_price() else {
            return Ok(());
        };
        match self.on_reference_tick(reference, Utc::now()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                let next = recovery_trigger(&e);
                warn!(
                    "Quoting after reconciliation failed: {}; reconciling ({}) in {}ms",
                    e,
                    next,
                    backoff.as_millis()
                );
                self.timers.arm_restart(backoff, next);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ==================== Event dispatch ====================

    pub async fn handle(&mut self, event: EngineEvent) -> Result<()> {
        self.handle_at(event, Utc::now()).await
    }

    /// Apply one event; only fatal errors are returned
    pub async fn handle_at(&mut self, event: EngineEvent, now: DateTime<Utc>) -> Result<()> {
        if self.stopped {
            debug!("Engine stopped, dropping {:?}", event);
            return Ok(());
        }

        let result = match event {
            market_event @ (EngineEvent::BookSnapshot { .. }
            | EngineEvent::BookDelta { .. }
            | EngineEvent::Trade { .. }) => match self.market.apply(&market_event) {
                Some(price) => self.on_reference_tick(price, now).await,
                None => Ok(()),
            },
            EngineEvent::Balances { venue, balances } => {
                self.on_balances(venue, &balances);
                Ok(())
            }
            EngineEvent::Order {
                venue: VenueRole::Quote,
                update,
            } => self.on_quote_order(update, now).await,
            EngineEvent::Order {
                venue: VenueRole::Reference,
                update,
            } => self.on_hedge_update(update).await,
            EngineEvent::Timer(timer) => self.on_timer(timer).await,
            EngineEvent::Restart { trigger } => self.restart(trigger).await,
            EngineEvent::Shutdown => self.stop().await,
        };

        self.recover_from(result).await
    }

    async fn recover_from(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                let trigger = recovery_trigger(&e);
                warn!("Recovering ({}) from: {}", trigger, e);
                self.restart(trigger).await
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn transition(&mut self, to: EngineState, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        if !self.state.can_transition_to(to) {
            return Err(XemmError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        info!(from = %self.state, to = %to, reason = %reason, "state transition");

        if self.history.len() >= TRANSITION_HISTORY {
            self.history.pop_front();
        }
        self.history
            .push_back(StateTransition::new(self.state, to, reason));
        self.state = to;
        Ok(())
    }

    fn on_balances(&mut self, venue: VenueRole, updates: &[BalanceUpdate]) {
        self.balances.apply(venue, updates);
        if venue == VenueRole::Reference {
            self.confirm_hedges_by_balance();
        }
    }

    // ==================== Quoting ====================

    async fn on_reference_tick(&mut self, reference: Decimal, now: DateTime<Utc>) -> Result<()> {
        if self.state != EngineState::Idle {
            debug!("Reference {} ignored in {}", reference, self.state);
            return Ok(());
        }
        let Some(direction) = self.direction else {
            return Ok(());
        };

        if !self.orders.is_empty() {
            return self.cancel_invalid_orders(reference, now).await;
        }

        self.try_place(direction, reference, now).await
    }

    async fn cancel_invalid_orders(&mut self, reference: Decimal, now: DateTime<Utc>) -> Result<()> {
        let invalid: Vec<(String, CancelReason)> = self
            .orders
            .values()
            .filter(|order| order.status != OrderStatus::Cancelling)
            .filter_map(|order| {
                self.pricer
                    .cancel_reason(order, reference, now)
                    .map(|reason| (order.id.clone(), reason))
            })
            .collect();

        if invalid.is_empty() {
            return Ok(());
        }

        self.transition(
            EngineState::Cancelling,
            format!("{} order(s) invalid at reference {}", invalid.len(), reference),
        )?;

        let request_timeout = self.config.execution.request_timeout();
        let cancel_timeout = self.config.execution.cancel_timeout();

        for (order_id, reason) in invalid {
            let intent_id = Uuid::new_v4();
            if let Some(order) = self.orders.get_mut(&order_id) {
                order.status = OrderStatus::Cancelling;
            }
            self.cancelling.insert(order_id.clone(), intent_id);
            self.stats.cancels += 1;
            info!("Cancelling order {}: {}", order_id, reason);

            // A rejected cancel usually means the order already left the book;
            // the push or the timeout settles it either way.
            if let Err(e) = with_timeout(
                VenueRole::Quote,
                request_timeout,
                self.quote.cancel_order(&order_id),
            )
            .await
            {
                warn!("Cancel request for {} failed: {}", order_id, e);
            }

            self.timers.arm(
                cancel_timeout,
                TimerEvent::CancelTimeout {
                    intent_id,
                    order_id,
                },
            );
        }

        Ok(())
    }

    async fn try_place(
        &mut self,
        direction: Direction,
        reference: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let book = self.market.book(VenueRole::Quote);
        let (best_bid, best_ask) = match (book.best_bid(), book.best_ask()) {
            (Ok(bid), Ok(ask)) => (bid, ask),
            _ => {
                debug!("Quote venue book not ready, skipping placement");
                return Ok(());
            }
        };

        let quote = match self
            .pricer
            .build_quote(direction, reference, best_bid, best_ask, &self.balances)
        {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                debug!(
                    "No tick clears the edge: reference {}, book {} / {}",
                    reference, best_bid, best_ask
                );
                return Ok(());
            }
            Err(e @ XemmError::BalanceUnknown { .. }) | Err(e @ XemmError::NotAvailable(_)) => {
                debug!("Skipping placement: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.transition(
            EngineState::Placing,
            format!("{} {} @ {} (reference {})", quote.side, quote.volume, quote.price, reference),
        )?;

        let request = OrderRequest::limit(quote.side, quote.price, quote.volume);
        let handle = with_timeout(
            VenueRole::Quote,
            self.config.execution.request_timeout(),
            self.quote.place_order(&request),
        )
        .await?;

        let intent_id = Uuid::new_v4();
        self.identity.mark_placed(&handle.id);
        self.stats.placements += 1;
        info!(
            "Placed {} {} @ {} as order {}",
            quote.side, quote.volume, quote.price, handle.id
        );

        self.pending = Some(PendingPlacement {
            intent_id,
            order: Order::from_handle(&handle, quote.price, now),
        });
        self.timers.arm(
            self.config.execution.placement_timeout(),
            TimerEvent::PlacementTimeout { intent_id },
        );
        Ok(())
    }

    // ==================== Quote venue order pushes ====================

    async fn on_quote_order(&mut self, update: OrderUpdate, now: DateTime<Utc>) -> Result<()> {
        // The account may carry orders this engine never placed
        if !self.identity.is_ours(update.order_id()) {
            debug!("Ignoring push for foreign order {}", update.order_id());
            return Ok(());
        }

        match update {
            OrderUpdate::Confirmed { order_id, .. } => self.on_confirmed(&order_id),
            OrderUpdate::Cancelled { order_id } => self.on_cancelled(&order_id),
            OrderUpdate::Filled {
                order_id,
                trade_id,
                side,
                price,
                volume,
            } => {
                debug!(
                    "Fill {} on {}: {} {} @ {}",
                    trade_id, order_id, side, volume, price
                );
                self.on_fill(&order_id, &trade_id, volume, now).await
            }
        }
    }

    fn is_pending(&self, order_id: &str) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.order.id == order_id)
    }

    /// Move the pending placement into the active set
    fn materialize_pending(&mut self) -> Option<String> {
        let mut order = self.pending.take()?.order;
        order.confirm();
        let order_id = order.id.clone();
        self.orders.insert(order_id.clone(), order);
        Some(order_id)
    }

    fn on_confirmed(&mut self, order_id: &str) -> Result<()> {
        if self.is_pending(order_id) {
            self.materialize_pending();
            info!("Order {} resting", order_id);
            if self.state == EngineState::Placing {
                self.transition(EngineState::Idle, "placement confirmed")?;
            }
        } else if self.orders.contains_key(order_id) {
            debug!("Duplicate confirmation for {}", order_id);
        } else {
            debug!("Ignoring confirmation for untracked order {}", order_id);
        }
        Ok(())
    }

    fn on_cancelled(&mut self, order_id: &str) -> Result<()> {
        if let Some(order) = self.orders.remove(order_id) {
            self.identity.mark_cancelled(order_id, order.side);
            self.cancelling.remove(order_id);
            info!(
                "Order {} cancelled ({} of {} filled)",
                order_id,
                order.filled(),
                order.volume
            );
            if self.state == EngineState::Cancelling && self.cancelling.is_empty() {
                self.transition(EngineState::Idle, "cancel confirmed")?;
            }
        } else if self.is_pending(order_id) {
            if let Some(pending) = self.pending.take() {
                self.identity.mark_cancelled(order_id, pending.order.side);
            }
            warn!("Order {} cancelled by venue before confirmation", order_id);
            if self.state == EngineState::Placing {
                self.transition(EngineState::Idle, "placement cancelled by venue")?;
            }
        } else {
            // Also covers a cancel racing a full fill: the fill already won
            debug!("Ignoring cancellation for untracked order {}", order_id);
        }
        Ok(())
    }

    async fn on_fill(
        &mut self,
        order_id: &str,
        trade_id: &str,
        volume: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.identity.record_trade(trade_id) {
            debug!("Duplicate fill {} on {}", trade_id, order_id);
            return Ok(());
        }

        if self.is_pending(order_id) {
            // A fill is as good as a confirmation
            self.materialize_pending();
        }

        let (resting_side, filled, complete) = if let Some(order) = self.orders.get_mut(order_id) {
            match order.apply_fill(trade_id, volume) {
                FillOutcome::Duplicate => return Ok(()),
                FillOutcome::Partial { filled, remaining } => {
                    info!(
                        "Order {} partially filled: {} @ {}, {} remaining",
                        order_id, filled, order.price, remaining
                    );
                    (order.side, filled, false)
                }
                FillOutcome::Complete { filled } => {
                    info!("Order {} filled: {} @ {}", order_id, filled, order.price);
                    (order.side, filled, true)
                }
            }
        } else if let Some(side) = self.identity.cancelled_side(order_id) {
            warn!(
                "Fill {} on cancelled order {} ({}); hedging anyway",
                trade_id, order_id, volume
            );
            (side, volume, false)
        } else {
            warn!("Fill {} for untracked order {} ignored", trade_id, order_id);
            return Ok(());
        };

        self.stats.fills += 1;
        if complete {
            self.orders.remove(order_id);
            self.cancelling.remove(order_id);
            self.identity.retire(order_id);
        }

        self.submit_hedge(order_id, hedge_side(resting_side), filled, now)
            .await?;

        if self.state == EngineState::Placing && self.pending.is_none() {
            self.transition(EngineState::Idle, "placement resolved by fill")?;
        } else if complete
            && self.state == EngineState::Cancelling
            && self.cancelling.is_empty()
        {
            self.transition(EngineState::Idle, "order filled while cancelling")?;
        }
        Ok(())
    }

    // ==================== Timers ====================

    async fn on_timer(&mut self, timer: TimerEvent) -> Result<()> {
        match timer {
            TimerEvent::PlacementTimeout { intent_id } => {
                let outstanding = self
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.intent_id == intent_id);
                if !outstanding {
                    debug!("Placement timer {} already resolved", intent_id);
                    return Ok(());
                }
                warn!(
                    "No confirmation for placement {} after {}ms",
                    intent_id, self.config.execution.placement_timeout_ms
                );
                self.restart(RecoveryTrigger::PlacementTimeout).await
            }
            TimerEvent::CancelTimeout {
                intent_id,
                order_id,
            } => {
                if self.cancelling.get(&order_id) != Some(&intent_id) {
                    debug!("Cancel timer for {} already resolved", order_id);
                    return Ok(());
                }
                warn!(
                    "No confirmation for cancel of {} after {}ms",
                    order_id, self.config.execution.cancel_timeout_ms
                );
                self.restart(RecoveryTrigger::CancelTimeout).await
            }
            TimerEvent::HedgeTimeout { hedge_id } => {
                if !self.hedges.is_pending(&hedge_id) {
                    debug!("Hedge {} already confirmed", hedge_id);
                    return Ok(());
                }
                warn!(
                    "Hedge {} unconfirmed after {}ms",
                    hedge_id, self.config.execution.hedge_timeout_ms
                );
                self.restart(RecoveryTrigger::HedgeAnomaly).await
            }
        }
    }

    /// Drop every local trace of orders, intents and identities
    pub(crate) fn clear_order_state(&mut self) {
        self.orders.clear();
        self.pending = None;
        self.cancelling.clear();
        self.identity.clear();
    }
}

fn recovery_trigger(error: &XemmError) -> RecoveryTrigger {
    match error {
        XemmError::InsufficientBalance { .. } => RecoveryTrigger::InsufficientBalance,
        _ => RecoveryTrigger::VenueError,
    }
}

/// Counter-venue side offsetting a fill on a resting order
fn hedge_side(resting: OrderSide) -> OrderSide {
    resting.opposite()
}
