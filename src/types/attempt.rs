use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per HTTP attempt, appended when the attempt outcome is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub attempt_no: i64,
    pub started_at: String,
    pub finished_at: String,

    pub response_status: Option<i64>,
    pub response_body: Option<String>,

    pub error_kind: Option<AttemptErrorKind>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    Timeout,
    Network,
    HttpStatus,
    Unexpected,
}
