use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::store::{StoreError, format_utc, parse_uuid};
use crate::types::{
    AttemptErrorKind, DeliveryAttempt, DeliveryListItem, DeliveryStatus, DeliverySummary,
    GetDeliveryResponse,
};

#[derive(Debug, Clone)]
pub struct DeliveryCursor {
    pub created_at: String,
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ListDeliveriesParams {
    pub limit: i64,
    pub before: Option<DeliveryCursor>,
    pub status: Option<DeliveryStatus>,
    pub endpoint_id: Option<Uuid>,
    pub event_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListDeliveriesResult {
    pub deliveries: Vec<DeliveryListItem>,
    pub next_before: Option<DeliveryCursor>,
}

/// Delivery history, newest first, keyset-paginated on (created_at, id).
pub async fn list_deliveries(
    pool: &SqlitePool,
    params: &ListDeliveriesParams,
) -> Result<ListDeliveriesResult, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT \
            d.id, \
            d.endpoint_id, \
            d.replayed_from_delivery_id, \
            d.event_type, \
            d.status, \
            d.attempt_count, \
            d.last_http_status, \
            d.created_at, \
            d.next_attempt_at, \
            d.delivered_at, \
            d.last_error, \
            e.url AS endpoint_url \
        FROM deliveries d \
        JOIN endpoints e ON e.id = d.endpoint_id \
        WHERE 1 = 1",
    );

    if let Some(status) = params.status {
        query.push(" AND d.status = ");
        query.push_bind(status.as_str());
    }

    if let Some(endpoint_id) = params.endpoint_id {
        query.push(" AND d.endpoint_id = ");
        query.push_bind(endpoint_id.to_string());
    }

    if let Some(event_type) = params.event_type.as_deref() {
        query.push(" AND d.event_type = ");
        query.push_bind(event_type);
    }

    if let Some(cursor) = &params.before {
        query.push(" AND (d.created_at < ");
        query.push_bind(&cursor.created_at);
        query.push(" OR (d.created_at = ");
        query.push_bind(&cursor.created_at);
        query.push(" AND d.id < ");
        query.push_bind(cursor.id.to_string());
        query.push("))");
    }

    query.push(" ORDER BY d.created_at DESC, d.id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<ListRow> = query.build_query_as().fetch_all(pool).await?;

    let has_more = rows.len() > params.limit as usize;
    let take_count = if has_more {
        params.limit as usize
    } else {
        rows.len()
    };

    let mut deliveries = Vec::with_capacity(take_count);
    let mut last_cursor = None;

    for row in rows.into_iter().take(take_count) {
        let (item, cursor) = list_item_from_row(row)?;
        last_cursor = Some(cursor);
        deliveries.push(item);
    }

    let next_before = if has_more { last_cursor } else { None };

    Ok(ListDeliveriesResult {
        deliveries,
        next_before,
    })
}

pub async fn get_delivery(
    pool: &SqlitePool,
    delivery_id: Uuid,
) -> Result<GetDeliveryResponse, StoreError> {
    let url: String = sqlx::query_scalar(
        r#"
        SELECT e.url
        FROM deliveries d
        JOIN endpoints e ON e.id = d.endpoint_id
        WHERE d.id = ?
        "#,
    )
    .bind(delivery_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    let delivery = crate::delivery::get_delivery(pool, delivery_id).await?;

    Ok(GetDeliveryResponse {
        delivery,
        endpoint_url: url,
    })
}

pub async fn list_attempts(
    pool: &SqlitePool,
    delivery_id: Uuid,
) -> Result<Vec<DeliveryAttempt>, StoreError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM deliveries WHERE id = ?")
        .bind(delivery_id.to_string())
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(StoreError::NotFound("delivery not found".to_string()));
    }

    let rows: Vec<AttemptRow> = sqlx::query_as(
        r#"
        SELECT
            id,
            delivery_id,
            attempt_no,
            started_at,
            finished_at,
            response_status,
            response_body,
            error_kind,
            error_message
        FROM delivery_attempts
        WHERE delivery_id = ?
        ORDER BY attempt_no ASC
        "#,
    )
    .bind(delivery_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AttemptRow::try_into).collect()
}

/// Clones a delivery into a fresh pending record with its own id. The
/// envelope's `id` field is rewritten so the replay carries a new
/// idempotency key; the original record is never touched.
pub async fn replay_delivery(
    pool: &SqlitePool,
    delivery_id: Uuid,
) -> Result<DeliverySummary, StoreError> {
    let mut tx = pool.begin().await?;

    let source = sqlx::query_as::<_, ReplaySourceRow>(
        r#"
        SELECT endpoint_id, event_type, payload
        FROM deliveries
        WHERE id = ?
        "#,
    )
    .bind(delivery_id.to_string())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    let new_id = Uuid::new_v4();
    let mut envelope: serde_json::Value = serde_json::from_str(&source.payload)
        .map_err(|err| StoreError::Parse(format!("invalid payload JSON: {err}")))?;
    if let Some(object) = envelope.as_object_mut() {
        object.insert(
            "id".to_string(),
            serde_json::Value::String(new_id.to_string()),
        );
    }
    let payload = serde_json::to_string(&envelope)
        .map_err(|err| StoreError::Parse(format!("failed to serialize payload: {err}")))?;

    let now_str = format_utc(Utc::now());

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
    .bind(new_id.to_string())
    .bind(&source.endpoint_id)
    .bind(delivery_id.to_string())
    .bind(&source.event_type)
    .bind(&payload)
    .bind(&now_str)
    .bind(&now_str)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(DeliverySummary {
        id: new_id,
        endpoint_id: parse_uuid("endpoint id", &source.endpoint_id)?,
        replayed_from_delivery_id: Some(delivery_id),
        event_type: source.event_type,
        status: DeliveryStatus::Pending,
        attempt_count: 0,
        last_http_status: None,
        created_at: now_str.clone(),
        next_attempt_at: Some(now_str),
        delivered_at: None,
        last_error: None,
    })
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    endpoint_id: String,
    replayed_from_delivery_id: Option<String>,
    event_type: String,
    status: String,
    attempt_count: i64,
    last_http_status: Option<i64>,
    created_at: String,
    next_attempt_at: Option<String>,
    delivered_at: Option<String>,
    last_error: Option<String>,
    endpoint_url: String,
}

fn list_item_from_row(row: ListRow) -> Result<(DeliveryListItem, DeliveryCursor), StoreError> {
    let id = parse_uuid("delivery id", &row.id)?;
    let status = DeliveryStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
    let replayed_from_delivery_id = row
        .replayed_from_delivery_id
        .as_deref()
        .map(|value| parse_uuid("replayed_from_delivery_id", value))
        .transpose()?;

    let cursor = DeliveryCursor {
        created_at: row.created_at.clone(),
        id,
    };

    let summary = DeliverySummary {
        id,
        endpoint_id: parse_uuid("endpoint id", &row.endpoint_id)?,
        replayed_from_delivery_id,
        event_type: row.event_type,
        status,
        attempt_count: row.attempt_count,
        last_http_status: row.last_http_status,
        created_at: row.created_at,
        next_attempt_at: row.next_attempt_at,
        delivered_at: row.delivered_at,
        last_error: row.last_error,
    };

    Ok((
        DeliveryListItem {
            delivery: summary,
            endpoint_url: row.endpoint_url,
        },
        cursor,
    ))
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    delivery_id: String,
    attempt_no: i64,
    started_at: String,
    finished_at: String,
    response_status: Option<i64>,
    response_body: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let error_kind = row
            .error_kind
            .as_deref()
            .map(parse_error_kind)
            .transpose()?;

        Ok(DeliveryAttempt {
            id: parse_uuid("attempt id", &row.id)?,
            delivery_id: parse_uuid("delivery id", &row.delivery_id)?,
            attempt_no: row.attempt_no,
            started_at: row.started_at,
            finished_at: row.finished_at,
            response_status: row.response_status,
            response_body: row.response_body,
            error_kind,
            error_message: row.error_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReplaySourceRow {
    endpoint_id: String,
    event_type: String,
    payload: String,
}

fn parse_error_kind(value: &str) -> Result<AttemptErrorKind, StoreError> {
    match value {
        "timeout" => Ok(AttemptErrorKind::Timeout),
        "network" => Ok(AttemptErrorKind::Network),
        "http_status" => Ok(AttemptErrorKind::HttpStatus),
        "unexpected" => Ok(AttemptErrorKind::Unexpected),
        other => Err(StoreError::Parse(format!("unknown error kind: {other}"))),
    }
}
