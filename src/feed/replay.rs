//! JSON-lines market replay.
//!
//! Each line is one `EngineEvent` market record with an optional `delay_ms` field giving
//! the pause before it is delivered:
//!
//! ```text
//! {"delay_ms":250,"type":"book_snapshot","venue":"reference","bids":[...],"asks":[...]}
//! {"type":"trade","venue":"reference","price":"100.02","volume":"0.4"}
//! ```

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::EngineEvent;
use crate::error::{Result, XemmError};
use crate::exchange::{EventSink, PaperVenue};

// ─────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────

/// One replayed event and the pause before it
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub delay: Duration,
    pub event: EngineEvent,
}

fn is_market_record(event: &EngineEvent) -> bool {
    matches!(
        event,
        EngineEvent::BookSnapshot { .. }
            | EngineEvent::BookDelta { .. }
            | EngineEvent::Trade { .. }
            | EngineEvent::Balances { .. }
    )
}

/// Parse one line; blank lines and `#` comments yield None
pub fn parse_line(line: &str) -> Result<Option<ReplayRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut value: serde_json::Value = serde_json::from_str(trimmed)?;
    let delay_ms = value
        .as_object_mut()
        .and_then(|fields| fields.remove("delay_ms"))
        .and_then(|delay| delay.as_u64())
        .unwrap_or(0);

    let event: EngineEvent = serde_json::from_value(value)?;
    if !is_market_record(&event) {
        return Err(XemmError::Internal(format!(
            "replay supports market records only, got {:?}",
            event
        )));
    }

    Ok(Some(ReplayRecord {
        delay: Duration::from_millis(delay_ms),
        event,
    }))
}

// ─────────────────────────────────────────────────────────────
// ReplayFeed
// ─────────────────────────────────────────────────────────────

/// Pushes pre-loaded market records into the engine queue in file order
pub struct ReplayFeed {
    records: Vec<ReplayRecord>,
    venues: Vec<Arc<PaperVenue>>,
    shutdown_at_end: bool,
}

impl ReplayFeed {
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        Self {
            records,
            venues: Vec::new(),
            shutdown_at_end: false,
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut records = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let record =
                parse_line(line).with_context(|| format!("replay line {}", index + 1))?;
            records.extend(record);
        }
        Ok(Self::new(records))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let feed = Self::parse(&raw)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;
        info!("Loaded {} replay records from {}", feed.len(), path.display());
        Ok(feed)
    }

    /// Let a paper venue observe its own market data (for fill simulation)
    pub fn with_venue(mut self, venue: Arc<PaperVenue>) -> Self {
        self.venues.push(venue);
        self
    }

    /// Send `Shutdown` after the last record
    pub fn with_shutdown_at_end(mut self, shutdown: bool) -> Self {
        self.shutdown_at_end = shutdown;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deliver every record; returns how many were sent
    pub async fn run(self, sink: EventSink) -> usize {
        let mut sent = 0;

        for record in self.records {
            if !record.delay.is_zero() {
                tokio::time::sleep(record.delay).await;
            }

            if sink.send(record.event.clone()).is_err() {
                debug!("Engine queue closed, stopping replay after {} records", sent);
                return sent;
            }
            sent += 1;

            for venue in &self.venues {
                venue.observe(&record.event).await;
            }
        }

        info!("Replay finished: {} records", sent);
        if self.shutdown_at_end {
            let _ = sink.send(EngineEvent::Shutdown);
        }
        sent
    }
}
