#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempt ceiling for endpoints that do not carry their own override.
    pub default_max_retries: u32,
    /// Request timeout for endpoints that do not carry their own override.
    pub default_timeout_secs: u64,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// How long a claimed delivery stays invisible to other claimers. Must
    /// exceed the effective request timeout.
    pub claim_ms: i64,
    pub batch_limit: i64,
    pub poll_interval_ms: u64,
    pub max_in_flight: usize,
    pub retention_max_age_hours: u64,
    pub retention_interval_secs: u64,
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("NOTIFIER_MAX_RETRIES")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.default_max_retries = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.default_timeout_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_BACKOFF_BASE_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.base_delay_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_BACKOFF_MAX_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.max_delay_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_CLAIM_MS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.claim_ms = parsed.max(1_000);
        }
        if let Ok(value) = std::env::var("NOTIFIER_BATCH_LIMIT")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.batch_limit = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_POLL_INTERVAL_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.poll_interval_ms = parsed.max(100);
        }
        if let Ok(value) = std::env::var("NOTIFIER_MAX_IN_FLIGHT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.max_in_flight = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_RETENTION_MAX_AGE_HOURS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.retention_max_age_hours = parsed.max(1);
        }
        if let Ok(value) = std::env::var("NOTIFIER_RETENTION_INTERVAL_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.retention_interval_secs = parsed.max(60);
        }

        config
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 5,
            default_timeout_secs: 30,
            base_delay_secs: 1,
            max_delay_secs: 300,
            claim_ms: 90_000,
            batch_limit: 100,
            poll_interval_ms: 5_000,
            max_in_flight: 8,
            retention_max_age_hours: 168,
            retention_interval_secs: 3_600,
        }
    }
}
