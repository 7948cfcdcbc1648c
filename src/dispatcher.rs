use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::delivery::{self, NewDelivery};
use crate::registry;
use crate::store::{StoreError, format_utc};
use crate::types::{DeliveryEnvelope, Event};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cloneable emit handle. Explicitly constructed from [`DeliveryService`]
/// and passed to whoever needs to report events; owns no worker state.
///
/// [`DeliveryService`]: crate::scheduler::DeliveryService
#[derive(Clone)]
pub struct Dispatcher {
    pool: SqlitePool,
    wake: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(pool: SqlitePool, wake: Arc<Notify>) -> Self {
        Self { pool, wake }
    }

    /// Fans one event out to every active endpoint of the event's owner that
    /// subscribes to its type. Synchronous up to delivery-record creation;
    /// the HTTP delivery itself happens asynchronously. Registry failures
    /// propagate; no matching endpoint is a no-op.
    pub async fn emit(&self, event: &Event) -> Result<Vec<Uuid>, EmitError> {
        let event_type = event.payload.event_type();
        let endpoints =
            registry::find_active_subscribers(&self.pool, event.owner_id, event_type).await?;
        if endpoints.is_empty() {
            return Ok(Vec::new());
        }

        let timestamp = format_utc(event.occurred_at);
        let mut rows = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let id = Uuid::new_v4();
            // Serialized once here; workers sign and send these exact bytes.
            let envelope = DeliveryEnvelope {
                id,
                event: event.payload.clone(),
                timestamp: timestamp.clone(),
                owner_id: event.owner_id,
            };
            rows.push(NewDelivery {
                id,
                endpoint_id: endpoint.id,
                replayed_from_delivery_id: None,
                event_type: event_type.to_string(),
                payload: serde_json::to_string(&envelope)?,
            });
        }

        delivery::insert_deliveries(&self.pool, &rows).await?;
        self.wake.notify_one();

        tracing::debug!(event_type, deliveries = rows.len(), "event fanned out");
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    /// Nudges the delivery loop to poll ahead of its interval.
    pub fn notify(&self) {
        self.wake.notify_one();
    }
}
