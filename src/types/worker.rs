use uuid::Uuid;

use super::AttemptErrorKind;

/// Parameters for atomically claiming a batch of due deliveries. A claimed
/// delivery is invisible to other claimers until `claim_ms` elapses, which
/// is what keeps a given delivery id on at most one worker at a time.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub limit: i64,
    pub claim_ms: i64,
    pub worker_id: String,
}

/// What a worker reports back after one HTTP attempt.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub worker_id: String,
    pub delivery_id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Delivered {
        http_status: i64,
    },
    Failed {
        http_status: Option<i64>,
        error_kind: AttemptErrorKind,
        error_message: String,
        response_body: Option<String>,
    },
}
