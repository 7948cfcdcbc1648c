use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Delivery, DeliveryAttempt, DeliveryStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub replayed_from_delivery_id: Option<Uuid>,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub attempt_count: i64,
    pub last_http_status: Option<i64>,
    pub created_at: String,
    pub next_attempt_at: Option<String>,
    pub delivered_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryListItem {
    pub delivery: DeliverySummary,
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeliveriesResponse {
    pub deliveries: Vec<DeliveryListItem>,
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDeliveryResponse {
    pub delivery: Delivery,
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAttemptsResponse {
    pub attempts: Vec<DeliveryAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDeliveryResponse {
    pub delivery: DeliverySummary,
}
