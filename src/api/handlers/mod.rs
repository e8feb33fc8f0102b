use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use crate::adapter::{Adapter, AdapterError, ErrorCode};
use crate::db::{ColumnInfo, Document};

// ============================================================
// Error Handling
// ============================================================

type ApiError = (StatusCode, Json<AdapterError>);

/// Pick the status for an adapter error. The body is always the error's
/// stable `{ code, message }` form; store details were already logged by the
/// store itself.
fn api_error(err: AdapterError) -> ApiError {
    let status = match err.code {
        ErrorCode::InvalidRequest | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ForeignKeyViolation => StatusCode::CONFLICT,
        ErrorCode::ConcurrencyBusy => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::TransactionFailure => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(code = err.code.as_str(), "Request failed: {}", err.message);
    } else {
        tracing::warn!(code = err.code.as_str(), "Request rejected: {}", err.message);
    }
    (status, Json(err))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Entities
// ============================================================

pub async fn list_entities(
    State(adapter): State<Adapter>,
    Path(entity_type): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    adapter.list(&entity_type).map(Json).map_err(api_error)
}

pub async fn create_entity(
    State(adapter): State<Adapter>,
    Path(entity_type): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    adapter
        .create(&entity_type, &payload)
        .map(|doc| (StatusCode::CREATED, Json(doc)))
        .map_err(api_error)
}

pub async fn get_entity(
    State(adapter): State<Adapter>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    adapter.get(&entity_type, &id).map(Json).map_err(api_error)
}

pub async fn update_entity(
    State(adapter): State<Adapter>,
    Path((entity_type, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> Result<Json<Document>, ApiError> {
    adapter
        .update(&entity_type, &id, &patch)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_entity(
    State(adapter): State<Adapter>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    adapter
        .delete(&entity_type, &id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

// ============================================================
// Diagnostics
// ============================================================

pub async fn list_tables(State(adapter): State<Adapter>) -> Result<Json<Vec<String>>, ApiError> {
    adapter.list_tables().map(Json).map_err(api_error)
}

pub async fn describe_table(
    State(adapter): State<Adapter>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ColumnInfo>>, ApiError> {
    adapter.describe_table(&name).map(Json).map_err(api_error)
}
