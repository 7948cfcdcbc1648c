use axum::{Json, extract::State};
use chrono::{DateTime, Utc};

use crate::{
    dispatcher::EmitError,
    error::ApiError,
    state::AppState,
    types::{EmitRequest, EmitResponse, Event},
};

/// Reports that something happened. Returns once the fan-out rows exist;
/// the HTTP deliveries themselves run in the background.
pub async fn emit_handler(
    State(state): State<AppState>,
    Json(req): Json<EmitRequest>,
) -> Result<Json<EmitResponse>, ApiError> {
    let occurred_at = match req.occurred_at.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|_| ApiError::validation("occurred_at must be RFC3339"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let event = Event {
        owner_id: req.owner_id,
        occurred_at,
        payload: req.payload,
    };

    let delivery_ids = state
        .dispatcher
        .emit(&event)
        .await
        .map_err(map_emit_error)?;

    Ok(Json(EmitResponse { delivery_ids }))
}

fn map_emit_error(err: EmitError) -> ApiError {
    match err {
        EmitError::Store(store_err) => ApiError::from(store_err),
        EmitError::Serialize(err) => {
            ApiError::Internal(format!("failed to serialize event: {err}"))
        }
    }
}
