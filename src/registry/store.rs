use std::collections::HashSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, parse_uuid};
use crate::types::Endpoint;

/// Active endpoints of `owner_id` subscribed to `event_type`. Subscription
/// sets are stored as JSON arrays, so the type filter happens after parsing.
pub async fn find_active_subscribers(
    pool: &SqlitePool,
    owner_id: Uuid,
    event_type: &str,
) -> Result<Vec<Endpoint>, StoreError> {
    let rows: Vec<EndpointRow> = sqlx::query_as(
        r#"
        SELECT
            id,
            owner_id,
            url,
            secret,
            event_types,
            active,
            timeout_secs,
            max_retries,
            consecutive_failure_count,
            last_success_at,
            last_failure_at
        FROM endpoints
        WHERE owner_id = ?
          AND active = 1
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut endpoints = Vec::new();
    for row in rows {
        let endpoint: Endpoint = row.try_into()?;
        if endpoint.subscribes_to(event_type) {
            endpoints.push(endpoint);
        }
    }

    Ok(endpoints)
}

/// Fresh read of a single endpoint. Workers call this right before every
/// attempt instead of trusting anything captured at scheduling time.
pub async fn get_endpoint(pool: &SqlitePool, endpoint_id: Uuid) -> Result<Endpoint, StoreError> {
    let row: EndpointRow = sqlx::query_as(
        r#"
        SELECT
            id,
            owner_id,
            url,
            secret,
            event_types,
            active,
            timeout_secs,
            max_retries,
            consecutive_failure_count,
            last_success_at,
            last_failure_at
        FROM endpoints
        WHERE id = ?
        "#,
    )
    .bind(endpoint_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("endpoint not found".to_string()))?;

    row.try_into()
}

/// Rolling bookkeeping written after each terminal outcome: success resets
/// the consecutive-failure counter, terminal failure increments it. No
/// automatic disabling happens here; operators layer that on top if wanted.
pub async fn record_outcome<'e, E>(
    executor: E,
    endpoint_id: Uuid,
    success: bool,
    at: &str,
) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let query = if success {
        r#"
        UPDATE endpoints
        SET consecutive_failure_count = 0,
            last_success_at = ?
        WHERE id = ?
        "#
    } else {
        r#"
        UPDATE endpoints
        SET consecutive_failure_count = consecutive_failure_count + 1,
            last_failure_at = ?
        WHERE id = ?
        "#
    };

    sqlx::query(query)
        .bind(at)
        .bind(endpoint_id.to_string())
        .execute(executor)
        .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    owner_id: String,
    url: String,
    secret: String,
    event_types: String,
    active: i64,
    timeout_secs: Option<i64>,
    max_retries: Option<i64>,
    consecutive_failure_count: i64,
    last_success_at: Option<String>,
    last_failure_at: Option<String>,
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = StoreError;

    fn try_from(row: EndpointRow) -> Result<Self, Self::Error> {
        let event_types: HashSet<String> = serde_json::from_str(&row.event_types)
            .map_err(|err| StoreError::Parse(format!("invalid event_types JSON: {err}")))?;

        Ok(Endpoint {
            id: parse_uuid("endpoint id", &row.id)?,
            owner_id: parse_uuid("owner id", &row.owner_id)?,
            url: row.url,
            secret: row.secret,
            event_types,
            active: row.active != 0,
            timeout_secs: row.timeout_secs.and_then(|v| u64::try_from(v).ok()),
            max_retries: row.max_retries.and_then(|v| u32::try_from(v).ok()),
            consecutive_failure_count: row.consecutive_failure_count,
            last_success_at: row.last_success_at,
            last_failure_at: row.last_failure_at,
        })
    }
}
