use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::DeliveryConfig;
use crate::delivery;
use crate::registry;
use crate::signer;
use crate::store::{StoreError, format_utc};
use crate::types::{AttemptErrorKind, AttemptOutcome, AttemptReport, Delivery, DeliveryStatus};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const DELIVERY_ID_HEADER: &str = "X-Webhook-Delivery";
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// Runs one claimed delivery through a single HTTP attempt and records the
/// outcome. Attempt failures never propagate to the caller; they land in the
/// delivery record and its attempt log.
pub async fn attempt_delivery(
    client: &reqwest::Client,
    pool: &SqlitePool,
    config: &DeliveryConfig,
    worker_id: &str,
    delivery: &Delivery,
) {
    // Always a fresh read: the endpoint may have been deactivated or had its
    // secret rotated since this delivery was scheduled.
    let endpoint = match registry::get_endpoint(pool, delivery.endpoint_id).await {
        Ok(endpoint) => endpoint,
        Err(err) => {
            tracing::error!(
                delivery_id = %delivery.id,
                error = %err,
                "endpoint fetch failed; claim will expire and the delivery will be retried"
            );
            return;
        }
    };

    if !endpoint.active {
        if let Err(err) = delivery::mark_deactivated(pool, worker_id, delivery.id).await {
            tracing::warn!(delivery_id = %delivery.id, error = %err, "marking deactivated delivery failed");
        } else {
            tracing::info!(delivery_id = %delivery.id, endpoint_id = %endpoint.id, "endpoint deactivated; delivery failed without an attempt");
        }
        return;
    }

    let signature = signer::sign(delivery.payload.as_bytes(), endpoint.secret.as_bytes());
    let timeout_secs = endpoint.timeout_secs.unwrap_or(config.default_timeout_secs);

    let started_at = format_utc(Utc::now());
    let response = client
        .post(&endpoint.url)
        .timeout(Duration::from_secs(timeout_secs))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, &signature)
        .header(DELIVERY_ID_HEADER, delivery.id.to_string())
        .body(delivery.payload.clone())
        .send()
        .await;
    let outcome = classify_response(response).await;
    let finished_at = format_utc(Utc::now());

    let report = AttemptReport {
        worker_id: worker_id.to_string(),
        delivery_id: delivery.id,
        started_at,
        finished_at,
        outcome,
    };

    match delivery::finish_attempt(pool, config, &report).await {
        Ok(recorded) => match recorded.status {
            DeliveryStatus::Success => {
                tracing::info!(delivery_id = %delivery.id, attempts = recorded.attempt_count, "delivered");
            }
            DeliveryStatus::Retrying => {
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempts = recorded.attempt_count,
                    next_attempt_at = recorded.next_attempt_at.as_deref().unwrap_or(""),
                    "attempt failed; retry scheduled"
                );
            }
            DeliveryStatus::Failed => {
                tracing::error!(delivery_id = %delivery.id, attempts = recorded.attempt_count, "retries exhausted; delivery failed");
            }
            DeliveryStatus::Pending => {}
        },
        Err(StoreError::Conflict(reason)) => {
            tracing::warn!(delivery_id = %delivery.id, reason, "attempt report rejected");
        }
        Err(err) => {
            tracing::error!(delivery_id = %delivery.id, error = %err, "recording attempt failed");
        }
    }
}

async fn classify_response(result: Result<reqwest::Response, reqwest::Error>) -> AttemptOutcome {
    match result {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                AttemptOutcome::Delivered {
                    http_status: i64::from(status.as_u16()),
                }
            } else {
                // Every non-2xx is retryable; a misconfigured receiver today
                // may be fixed before the next attempt.
                let body = response.text().await.unwrap_or_default();
                AttemptOutcome::Failed {
                    http_status: Some(i64::from(status.as_u16())),
                    error_kind: AttemptErrorKind::HttpStatus,
                    error_message: format!("receiver returned {status}"),
                    response_body: if body.is_empty() { None } else { Some(body) },
                }
            }
        }
        Err(err) => {
            let error_kind = if err.is_timeout() {
                AttemptErrorKind::Timeout
            } else if err.is_connect() || err.is_request() {
                AttemptErrorKind::Network
            } else {
                AttemptErrorKind::Unexpected
            };
            AttemptOutcome::Failed {
                http_status: None,
                error_kind,
                error_message: err.to_string(),
                response_body: None,
            }
        }
    }
}
