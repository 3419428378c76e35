use thiserror::Error;

use crate::domain::VenueRole;

/// Main error type for the market-making engine
#[derive(Error, Debug)]
pub enum XemmError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Market data errors
    #[error("Market data not available: {0}")]
    NotAvailable(String),

    #[error("Balance unknown for {currency} on {venue}")]
    BalanceUnknown { venue: VenueRole, currency: String },

    #[error("Insufficient balance: size {size} below venue minimum {min_volume}")]
    InsufficientBalance {
        size: rust_decimal::Decimal,
        min_volume: rust_decimal::Decimal,
    },

    // Venue errors
    #[error("{venue} rejected request [{code}]: {message}")]
    VenueRejected {
        venue: VenueRole,
        code: String,
        message: String,
    },

    #[error("{venue} unreachable: {message}")]
    VenueUnreachable { venue: VenueRole, message: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Direction cannot be determined: {0}")]
    DirectionUnavailable(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl XemmError {
    /// Runtime errors the engine recovers from through reconciliation.
    ///
    /// Everything else (bad configuration, no starting balances) ends the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            XemmError::NotAvailable(_)
                | XemmError::BalanceUnknown { .. }
                | XemmError::InsufficientBalance { .. }
                | XemmError::VenueRejected { .. }
                | XemmError::VenueUnreachable { .. }
                | XemmError::InvalidStateTransition { .. }
        )
    }

    pub fn venue_rejected(
        venue: VenueRole,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        XemmError::VenueRejected {
            venue,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn venue_unreachable(venue: VenueRole, message: impl Into<String>) -> Self {
        XemmError::VenueUnreachable {
            venue,
            message: message.into(),
        }
    }
}

/// Result type alias for XemmError
pub type Result<T> = std::result::Result<T, XemmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_recoverable_classification() {
        assert!(XemmError::venue_rejected(VenueRole::Quote, "2006", "price too low").is_recoverable());
        assert!(XemmError::venue_unreachable(VenueRole::Reference, "timeout").is_recoverable());
        assert!(XemmError::InsufficientBalance {
            size: dec!(0.0001),
            min_volume: dec!(0.0002),
        }
        .is_recoverable());

        assert!(!XemmError::InvalidConfig("tick_size must be positive".into()).is_recoverable());
        assert!(!XemmError::DirectionUnavailable("no balances".into()).is_recoverable());
    }

    #[test]
    fn test_venue_rejected_message() {
        let err = XemmError::venue_rejected(VenueRole::Quote, "2011", "insufficient margin");
        assert_eq!(err.to_string(), "quote venue rejected request [2011]: insufficient margin");
    }
}
