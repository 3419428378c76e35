use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// No mutating intent outstanding
    Idle,
    /// Placement submitted, waiting for venue confirmation
    Placing,
    /// Cancel(s) submitted, waiting for venue confirmation
    Cancelling,
    /// Reconciling or stopped; no new intents
    Suspended,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "IDLE",
            EngineState::Placing => "PLACING",
            EngineState::Cancelling => "CANCELLING",
            EngineState::Suspended => "SUSPENDED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        use EngineState::*;

        match (self, target) {
            // A new intent only starts from Idle
            (Idle, Placing) => true,
            (Idle, Cancelling) => true,

            // Confirmation or compensating timeout
            (Placing, Idle) => true,
            (Cancelling, Idle) => true,

            // Reconciliation is safe from any state, including a re-run
            (_, Suspended) => true,

            // Only a completed reconciliation leaves Suspended
            (Suspended, Idle) => true,

            _ => false,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: EngineState, to: EngineState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
