use std::time::Duration;
use tracing::debug;

use crate::domain::{EngineEvent, RecoveryTrigger, TimerEvent};
use crate::exchange::EventSink;

/// Arms one-shot timers that report back through the engine queue.
///
/// Timers are never cancelled; the engine checks on delivery whether the intent they
/// guard is still outstanding.
#[derive(Debug, Clone)]
pub struct TimerScheduler {
    sink: EventSink,
    armed: u64,
}

impl TimerScheduler {
    pub fn new(sink: EventSink) -> Self {
        Self { sink, armed: 0 }
    }

    pub fn arm(&mut self, delay: Duration, timer: TimerEvent) {
        self.armed += 1;
        debug!("Arming {:?} in {}ms", timer, delay.as_millis());
        self.send_after(delay, EngineEvent::Timer(timer));
    }

    /// Ask for another reconciliation after a failed rebuild
    pub fn arm_restart(&mut self, delay: Duration, trigger: RecoveryTrigger) {
        self.armed += 1;
        debug!("Arming restart ({}) in {}ms", trigger, delay.as_millis());
        self.send_after(delay, EngineEvent::Restart { trigger });
    }

    /// Timers armed since creation
    pub fn armed(&self) -> u64 {
        self.armed
    }

    fn send_after(&self, delay: Duration, event: EngineEvent) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sink.send(event);
        });
    }
}
