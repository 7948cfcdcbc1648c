use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EventPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitRequest {
    pub owner_id: Uuid,
    /// RFC3339; defaults to now when omitted.
    pub occurred_at: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitResponse {
    pub delivery_ids: Vec<Uuid>,
}
