use std::collections::HashSet;

use uuid::Uuid;

/// A registered subscriber. Created and updated by an external management
/// surface; this subsystem reads it and only writes the outcome bookkeeping
/// fields. Deliberately not serializable: the secret stays out of API
/// responses and logs.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub secret: String,
    pub event_types: HashSet<String>,
    pub active: bool,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,

    pub consecutive_failure_count: i64,
    pub last_success_at: Option<String>,
    pub last_failure_at: Option<String>,
}

impl Endpoint {
    /// An empty subscription set disables the endpoint.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.active && self.event_types.contains(event_type)
    }
}
