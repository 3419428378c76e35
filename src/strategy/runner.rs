use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info};

use super::engine::{EngineStats, XemmEngine};
use crate::config::AppConfig;
use crate::domain::{EngineEvent, RecoveryTrigger};
use crate::error::Result;
use crate::exchange::{EventSink, VenueClient};

/// Owns the engine and the queue it drains
pub struct EngineRunner {
    engine: XemmEngine,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    sink: EventSink,
}

impl EngineRunner {
    pub fn new(
        config: AppConfig,
        quote: Arc<dyn VenueClient>,
        reference: Arc<dyn VenueClient>,
    ) -> Self {
        let (sink, events) = mpsc::unbounded_channel();
        let engine = XemmEngine::new(config, quote, reference, sink.clone());
        Self {
            engine,
            events,
            sink,
        }
    }

    /// Producer handle for feeds, schedulers and signal handlers
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn engine(&self) -> &XemmEngine {
        &self.engine
    }

    /// Connect, let streams populate books and balances, then pick a direction.
    ///
    /// Any failure here is fatal.
    pub async fn start(&mut self) -> Result<()> {
        self.engine.start().await?;

        let warmup = self.engine.config().recovery.warmup();
        info!("Warming up for {}ms", warmup.as_millis());
        let deadline = Instant::now() + warmup;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                event = self.events.recv() => match event {
                    Some(EngineEvent::Shutdown) | None => {
                        info!("Shutdown during warmup");
                        return self.engine.stop().await;
                    }
                    Some(event) => self.engine.handle(event).await?,
                },
            }
        }

        let direction = self.engine.activate()?;
        info!("Engine active, {}", direction);
        self.engine.evaluate(Utc::now()).await
    }

    /// Drain events until shutdown; returns the final counters
    pub async fn run(mut self) -> Result<EngineStats> {
        let mut periodic = self
            .engine
            .config()
            .recovery
            .restart_interval()
            .map(|every| {
                let mut timer = interval_at(Instant::now() + every, every);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                timer
            });

        while !self.engine.is_stopped() {
            let result = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.engine.handle(event).await,
                    None => break,
                },
                _ = next_tick(&mut periodic) => {
                    info!("Periodic restart");
                    self.engine.restart(RecoveryTrigger::Periodic).await
                }
            };

            if let Err(e) = result {
                error!("Fatal engine error: {}", e);
                if let Err(stop_err) = self.engine.stop().await {
                    error!("Stop after fatal error failed: {}", stop_err);
                }
                return Err(e);
            }
        }

        self.engine.stop().await?;
        Ok(self.engine.stats())
    }

    /// Reconcile on request, outside the event queue
    pub async fn restart(&mut self, trigger: RecoveryTrigger) -> Result<()> {
        self.engine.restart(trigger).await
    }

    /// Cancel resting orders and close venues without draining the queue
    pub async fn shutdown(&mut self) -> Result<()> {
        self.engine.stop().await
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
