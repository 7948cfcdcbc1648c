use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::store::{StoreError, format_utc, parse_uuid, truncate_diagnostic};
use crate::types::{
    AttemptErrorKind, AttemptOutcome, AttemptReport, ClaimRequest, Delivery, DeliveryStatus,
};

const MAX_DIAGNOSTIC_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub replayed_from_delivery_id: Option<Uuid>,
    pub event_type: String,
    pub payload: String,
}

/// Creates the fan-out rows in one transaction: status `pending`, zero
/// attempts, due immediately.
pub async fn insert_deliveries(
    pool: &SqlitePool,
    deliveries: &[NewDelivery],
) -> Result<(), StoreError> {
    if deliveries.is_empty() {
        return Ok(());
    }

    let now_str = format_utc(Utc::now());
    let mut tx = pool.begin().await?;

    for delivery in deliveries {
        sqlx::query(
            r#"
            INSERT INTO deliveries (
                id,
                endpoint_id,
                replayed_from_delivery_id,
                event_type,
                payload,
                status,
                attempt_count,
                created_at,
                next_attempt_at
            )
            VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(delivery.id.to_string())
        .bind(delivery.endpoint_id.to_string())
        .bind(delivery.replayed_from_delivery_id.map(|id| id.to_string()))
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_delivery(pool: &SqlitePool, delivery_id: Uuid) -> Result<Delivery, StoreError> {
    let row: DeliveryRow = sqlx::query_as(&select_delivery_sql("WHERE id = ?"))
        .bind(delivery_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    row.try_into()
}

/// Atomically claims a batch of due deliveries: awaiting-attempt statuses,
/// `next_attempt_at` reached, and no live claim. An expired claim counts as
/// no claim, which is also how deliveries stranded by a dead process get
/// picked back up. The CTE update guarantees each claimed id is handed to
/// exactly one caller.
pub async fn claim_due(
    pool: &SqlitePool,
    req: &ClaimRequest,
) -> Result<Vec<Delivery>, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);
    let claimed_until = format_utc(now + Duration::milliseconds(req.claim_ms));

    let mut tx = pool.begin().await?;

    let claimed_ids: Vec<String> = sqlx::query_scalar(
        r#"
        WITH due AS (
            SELECT id
            FROM deliveries
            WHERE (status = 'pending' OR status = 'retrying')
                AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
                AND (claimed_until IS NULL OR claimed_until <= ?)
            ORDER BY next_attempt_at ASC
            LIMIT ?
        )
        UPDATE deliveries
        SET claimed_until = ?,
            claimed_by = ?
        WHERE id IN (SELECT id FROM due)
            AND (status = 'pending' OR status = 'retrying')
            AND (claimed_until IS NULL OR claimed_until <= ?)
        RETURNING id
        "#,
    )
    .bind(&now_str)
    .bind(&now_str)
    .bind(req.limit)
    .bind(&claimed_until)
    .bind(&req.worker_id)
    .bind(&now_str)
    .fetch_all(&mut *tx)
    .await?;

    if claimed_ids.is_empty() {
        tx.commit().await?;
        return Ok(Vec::new());
    }

    let mut fetch = QueryBuilder::new(select_delivery_sql("WHERE id IN ("));
    let mut fetch_list = fetch.separated(", ");
    for id in &claimed_ids {
        fetch_list.push_bind(id);
    }
    fetch_list.push_unseparated(")");

    let rows: Vec<DeliveryRow> = fetch.build_query_as().fetch_all(&mut *tx).await?;

    tx.commit().await?;

    rows.into_iter().map(DeliveryRow::try_into).collect()
}

#[derive(Debug, Clone)]
pub struct AttemptRecorded {
    pub status: DeliveryStatus,
    pub attempt_count: i64,
    pub next_attempt_at: Option<String>,
}

/// Records one finished HTTP attempt under the reporter's claim: bumps the
/// attempt counter, appends the attempt log row, and moves the state machine
/// to `success`, `retrying` (with backoff), or `failed` (retries exhausted).
/// Endpoint outcome bookkeeping is written in the same transaction for
/// terminal outcomes.
pub async fn finish_attempt(
    pool: &SqlitePool,
    config: &DeliveryConfig,
    report: &AttemptReport,
) -> Result<AttemptRecorded, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);
    let delivery_id = report.delivery_id.to_string();

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, FinishRow>(
        r#"
        SELECT d.endpoint_id, d.status, d.attempt_count, d.claimed_by, d.claimed_until,
               e.max_retries
        FROM deliveries d
        JOIN endpoints e ON e.id = d.endpoint_id
        WHERE d.id = ?
        "#,
    )
    .bind(&delivery_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    let status = DeliveryStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
    if status.is_terminal() {
        return Err(StoreError::Conflict("already_terminal".to_string()));
    }

    check_claim(&row.claimed_by, &row.claimed_until, &report.worker_id, now)?;

    let endpoint_id = parse_uuid("endpoint id", &row.endpoint_id)?;
    let attempt_no = row.attempt_count + 1;
    let max_retries = row
        .max_retries
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(config.default_max_retries)
        .max(1) as i64;

    let recorded = match &report.outcome {
        AttemptOutcome::Delivered { http_status } => {
            let result = sqlx::query(
                r#"
                UPDATE deliveries
                SET status = 'success',
                    attempt_count = attempt_count + 1,
                    last_http_status = ?,
                    last_error = NULL,
                    next_attempt_at = NULL,
                    claimed_until = NULL,
                    claimed_by = NULL,
                    delivered_at = ?
                WHERE id = ?
                  AND claimed_by = ?
                "#,
            )
            .bind(*http_status)
            .bind(&now_str)
            .bind(&delivery_id)
            .bind(&report.worker_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict("claim_not_owned".to_string()));
            }

            crate::registry::record_outcome(&mut *tx, endpoint_id, true, &now_str).await?;

            AttemptRecorded {
                status: DeliveryStatus::Success,
                attempt_count: attempt_no,
                next_attempt_at: None,
            }
        }
        AttemptOutcome::Failed {
            http_status,
            error_message,
            ..
        } => {
            let last_error = truncate_diagnostic(error_message, MAX_DIAGNOSTIC_LEN);

            if attempt_no >= max_retries {
                let result = sqlx::query(
                    r#"
                    UPDATE deliveries
                    SET status = 'failed',
                        attempt_count = attempt_count + 1,
                        last_http_status = ?,
                        last_error = ?,
                        next_attempt_at = NULL,
                        claimed_until = NULL,
                        claimed_by = NULL
                    WHERE id = ?
                      AND claimed_by = ?
                    "#,
                )
                .bind(*http_status)
                .bind(&last_error)
                .bind(&delivery_id)
                .bind(&report.worker_id)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict("claim_not_owned".to_string()));
                }

                crate::registry::record_outcome(&mut *tx, endpoint_id, false, &now_str).await?;

                AttemptRecorded {
                    status: DeliveryStatus::Failed,
                    attempt_count: attempt_no,
                    next_attempt_at: None,
                }
            } else {
                let next_attempt_at =
                    format_utc(now + Duration::seconds(backoff_delay_secs(config, attempt_no) as i64));

                let result = sqlx::query(
                    r#"
                    UPDATE deliveries
                    SET status = 'retrying',
                        attempt_count = attempt_count + 1,
                        last_http_status = ?,
                        last_error = ?,
                        next_attempt_at = ?,
                        claimed_until = NULL,
                        claimed_by = NULL
                    WHERE id = ?
                      AND claimed_by = ?
                    "#,
                )
                .bind(*http_status)
                .bind(&last_error)
                .bind(&next_attempt_at)
                .bind(&delivery_id)
                .bind(&report.worker_id)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict("claim_not_owned".to_string()));
                }

                AttemptRecorded {
                    status: DeliveryStatus::Retrying,
                    attempt_count: attempt_no,
                    next_attempt_at: Some(next_attempt_at),
                }
            }
        }
    };

    let (response_status, response_body, error_kind, error_message) = match &report.outcome {
        AttemptOutcome::Delivered { http_status } => (Some(*http_status), None, None, None),
        AttemptOutcome::Failed {
            http_status,
            error_kind,
            error_message,
            response_body,
        } => (
            *http_status,
            response_body
                .as_deref()
                .map(|body| truncate_diagnostic(body, MAX_DIAGNOSTIC_LEN)),
            Some(error_kind_to_str(*error_kind)),
            Some(truncate_diagnostic(error_message, MAX_DIAGNOSTIC_LEN)),
        ),
    };

    sqlx::query(
        r#"
        INSERT INTO delivery_attempts (
            id,
            delivery_id,
            attempt_no,
            started_at,
            finished_at,
            response_status,
            response_body,
            error_kind,
            error_message
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&delivery_id)
    .bind(attempt_no)
    .bind(&report.started_at)
    .bind(&report.finished_at)
    .bind(response_status)
    .bind(response_body.as_deref())
    .bind(error_kind)
    .bind(error_message.as_deref())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(recorded)
}

/// Terminal failure for a delivery whose endpoint was deactivated after
/// scheduling. No HTTP attempt happened, so the attempt counter and the
/// attempt log stay untouched.
pub async fn mark_deactivated(
    pool: &SqlitePool,
    worker_id: &str,
    delivery_id: Uuid,
) -> Result<(), StoreError> {
    let now = Utc::now();
    let delivery_id = delivery_id.to_string();

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, ClaimRow>(
        r#"
        SELECT status, claimed_by, claimed_until
        FROM deliveries
        WHERE id = ?
        "#,
    )
    .bind(&delivery_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    let status = DeliveryStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
    if status.is_terminal() {
        return Err(StoreError::Conflict("already_terminal".to_string()));
    }

    check_claim(&row.claimed_by, &row.claimed_until, worker_id, now)?;

    let result = sqlx::query(
        r#"
        UPDATE deliveries
        SET status = 'failed',
            last_error = 'endpoint deactivated',
            next_attempt_at = NULL,
            claimed_until = NULL,
            claimed_by = NULL
        WHERE id = ?
          AND claimed_by = ?
        "#,
    )
    .bind(&delivery_id)
    .bind(worker_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict("claim_not_owned".to_string()));
    }

    tx.commit().await?;
    Ok(())
}

/// Age-based cleanup of terminal rows and their attempt logs. Runs from the
/// retention task, never from the delivery workers.
pub async fn delete_older_than(pool: &SqlitePool, cutoff: &str) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM delivery_attempts
        WHERE delivery_id IN (
            SELECT id FROM deliveries
            WHERE (status = 'success' OR status = 'failed')
              AND created_at < ?
        )
        "#,
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        r#"
        DELETE FROM deliveries
        WHERE (status = 'success' OR status = 'failed')
          AND created_at < ?
        "#,
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}

/// `min(base * 2^(attempt_no - 1), max)`. With the defaults: 1s, 2s, 4s, …
/// capped at 300s.
pub fn backoff_delay_secs(config: &DeliveryConfig, attempt_no: i64) -> u64 {
    let attempt_no = attempt_no.max(1);
    let exponent = (attempt_no - 1).min(31) as u32;
    config
        .base_delay_secs
        .saturating_mul(1u64 << exponent)
        .min(config.max_delay_secs)
}

fn check_claim(
    claimed_by: &Option<String>,
    claimed_until: &Option<String>,
    worker_id: &str,
    now: chrono::DateTime<Utc>,
) -> Result<(), StoreError> {
    let claimed_by = claimed_by
        .as_deref()
        .ok_or_else(|| StoreError::Conflict("claim_missing".to_string()))?;
    if claimed_by != worker_id {
        return Err(StoreError::Conflict("claim_not_owned".to_string()));
    }

    let claimed_until = claimed_until
        .as_deref()
        .ok_or_else(|| StoreError::Conflict("claim_missing".to_string()))?;
    if let Ok(expires) = chrono::DateTime::parse_from_rfc3339(claimed_until)
        && expires <= now
    {
        return Err(StoreError::Conflict("claim_expired".to_string()));
    }

    Ok(())
}

fn select_delivery_sql(where_clause: &str) -> String {
    format!(
        "SELECT \
            id, \
            endpoint_id, \
            replayed_from_delivery_id, \
            event_type, \
            payload, \
            status, \
            attempt_count, \
            last_http_status, \
            last_error, \
            created_at, \
            next_attempt_at, \
            claimed_until, \
            claimed_by, \
            delivered_at \
        FROM deliveries {where_clause}"
    )
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    endpoint_id: String,
    replayed_from_delivery_id: Option<String>,
    event_type: String,
    payload: String,
    status: String,
    attempt_count: i64,
    last_http_status: Option<i64>,
    last_error: Option<String>,
    created_at: String,
    next_attempt_at: Option<String>,
    claimed_until: Option<String>,
    claimed_by: Option<String>,
    delivered_at: Option<String>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
        let replayed_from_delivery_id = row
            .replayed_from_delivery_id
            .as_deref()
            .map(|id| parse_uuid("replayed_from_delivery_id", id))
            .transpose()?;

        Ok(Delivery {
            id: parse_uuid("delivery id", &row.id)?,
            endpoint_id: parse_uuid("endpoint id", &row.endpoint_id)?,
            replayed_from_delivery_id,
            event_type: row.event_type,
            payload: row.payload,
            status,
            attempt_count: row.attempt_count,
            last_http_status: row.last_http_status,
            last_error: row.last_error,
            created_at: row.created_at,
            next_attempt_at: row.next_attempt_at,
            claimed_until: row.claimed_until,
            claimed_by: row.claimed_by,
            delivered_at: row.delivered_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FinishRow {
    endpoint_id: String,
    status: String,
    attempt_count: i64,
    claimed_by: Option<String>,
    claimed_until: Option<String>,
    max_retries: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    status: String,
    claimed_by: Option<String>,
    claimed_until: Option<String>,
}

fn error_kind_to_str(kind: AttemptErrorKind) -> &'static str {
    match kind {
        AttemptErrorKind::Timeout => "timeout",
        AttemptErrorKind::Network => "network",
        AttemptErrorKind::HttpStatus => "http_status",
        AttemptErrorKind::Unexpected => "unexpected",
    }
}
