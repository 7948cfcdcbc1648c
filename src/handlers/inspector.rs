use axum::{
    Json,
    extract::{Path, Query, State},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    inspector::{DeliveryCursor, ListDeliveriesParams, get_delivery, list_attempts,
        list_deliveries, replay_delivery},
    state::AppState,
    types::{
        DeliveryStatus, GetDeliveryResponse, ListAttemptsResponse, ListDeliveriesResponse,
        ReplayDeliveryResponse,
    },
};

#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    limit: Option<i64>,
    before: Option<String>,
    status: Option<String>,
    endpoint_id: Option<String>,
    event_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    created_at: String,
    id: String,
}

pub async fn list_deliveries_handler(
    State(state): State<AppState>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<ListDeliveriesResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };
    let status = match query.status {
        Some(raw) => Some(parse_status(&raw)?),
        None => None,
    };
    let endpoint_id = match query.endpoint_id {
        Some(raw) => Some(parse_uuid("endpoint_id", &raw)?),
        None => None,
    };
    let event_type = match query.event_type {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ApiError::validation("event_type must be non-empty"));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };

    let params = ListDeliveriesParams {
        limit,
        before,
        status,
        endpoint_id,
        event_type,
    };

    let result = list_deliveries(&state.pool, &params).await?;
    let next_before = match result.next_before {
        Some(cursor) => Some(encode_cursor(&cursor)?),
        None => None,
    };

    Ok(Json(ListDeliveriesResponse {
        deliveries: result.deliveries,
        next_before,
    }))
}

pub async fn get_delivery_handler(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<GetDeliveryResponse>, ApiError> {
    let delivery_id = parse_uuid("delivery_id", &delivery_id)?;
    let result = get_delivery(&state.pool, delivery_id).await?;
    Ok(Json(result))
}

pub async fn list_attempts_handler(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<ListAttemptsResponse>, ApiError> {
    let delivery_id = parse_uuid("delivery_id", &delivery_id)?;
    let attempts = list_attempts(&state.pool, delivery_id).await?;
    Ok(Json(ListAttemptsResponse { attempts }))
}

pub async fn replay_delivery_handler(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<ReplayDeliveryResponse>, ApiError> {
    let delivery_id = parse_uuid("delivery_id", &delivery_id)?;
    let delivery = replay_delivery(&state.pool, delivery_id).await?;
    state.dispatcher.notify();
    Ok(Json(ReplayDeliveryResponse { delivery }))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
}

fn parse_status(value: &str) -> Result<DeliveryStatus, ApiError> {
    DeliveryStatus::parse(value).ok_or_else(|| ApiError::validation("status is invalid"))
}

fn decode_cursor(raw: &str) -> Result<DeliveryCursor, ApiError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    let payload: CursorPayload = serde_json::from_slice(&decoded)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    DateTime::parse_from_rfc3339(&payload.created_at)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    let id = Uuid::parse_str(&payload.id)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    Ok(DeliveryCursor {
        created_at: payload.created_at,
        id,
    })
}

fn encode_cursor(cursor: &DeliveryCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        created_at: cursor.created_at.clone(),
        id: cursor.id.to_string(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::Internal("failed to encode cursor".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
}
