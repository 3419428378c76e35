use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::{Balance, EngineEvent, OrderHandle, OrderRequest, OrderSide, VenueRole};
use crate::error::{Result, XemmError};

/// Queue the engine drains; venue streams, timers and feeds push into it
pub type EventSink = mpsc::UnboundedSender<EngineEvent>;

/// Everything the engine needs from a trading venue.
///
/// Implementations own their transport (REST signing, websocket framing) and translate
/// push notifications into `EngineEvent`s tagged with the venue's role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Submit an order; the returned handle carries the venue-assigned id
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Cancel every open order on one side of the book
    async fn cancel_all(&self, side: OrderSide) -> Result<()>;

    async fn get_balances(&self) -> Result<HashMap<String, Balance>>;

    /// Start push subscriptions forwarding into `sink`
    async fn connect(&self, sink: EventSink) -> Result<()>;

    /// Tear down push subscriptions; calling it twice is harmless
    async fn close(&self) -> Result<()>;
}

/// Bound a venue call, mapping an elapsed deadline to `VenueUnreachable`
pub async fn with_timeout<T, F>(venue: VenueRole, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(XemmError::venue_unreachable(
            venue,
            format!("request timed out after {}ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_deadline() {
        let result: Result<()> = with_timeout(VenueRole::Quote, Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        match result {
            Err(XemmError::VenueUnreachable { venue, message }) => {
                assert_eq!(venue, VenueRole::Quote);
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_errors() {
        let result: Result<()> = with_timeout(VenueRole::Reference, Duration::from_secs(1), async {
            Err(XemmError::venue_rejected(VenueRole::Reference, "400", "bad size"))
        })
        .await;

        assert!(matches!(result, Err(XemmError::VenueRejected { .. })));
    }
}
