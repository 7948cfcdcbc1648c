use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attempt-tracked notification of one endpoint for one event. The unit
/// of retry and of idempotence: `id` doubles as the idempotency key receivers
/// use to discard duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub replayed_from_delivery_id: Option<Uuid>,
    pub event_type: String,
    /// Serialized envelope snapshot taken at creation. These exact bytes are
    /// signed and sent; endpoint secret rotation never changes them.
    pub payload: String,

    pub status: DeliveryStatus,
    pub attempt_count: i64,

    pub last_http_status: Option<i64>,
    pub last_error: Option<String>,

    pub created_at: String,
    pub next_attempt_at: Option<String>,

    pub claimed_until: Option<String>,
    pub claimed_by: Option<String>,

    pub delivered_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal records are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}
