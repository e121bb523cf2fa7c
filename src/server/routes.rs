use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::AppState;
use crate::errors::TrendError;
use crate::models::{DeviceUpdate, NewDevice, NewTagSet, TagSetUpdate, TrendParams};

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// An error ready to leave over HTTP: a status code, a short machine-readable
/// label, and a human-readable message.
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "internal_error",
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<TrendError> for ApiError {
    fn from(err: TrendError) -> Self {
        let (status, label) = match &err {
            TrendError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            TrendError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate_trend"),
            TrendError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            TrendError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            TrendError::Connect(_) => (StatusCode::INTERNAL_SERVER_ERROR, "connect_error"),
            TrendError::Read(_) => (StatusCode::INTERNAL_SERVER_ERROR, "read_error"),
            TrendError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            TrendError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        Self {
            status,
            error: label,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Store methods surface domain errors wrapped in anyhow.
        match err.downcast::<TrendError>() {
            Ok(trend_err) => trend_err.into(),
            Err(other) => {
                tracing::error!("Unhandled internal error: {:#}", other);
                ApiError::internal(other.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Device records
// ---------------------------------------------------------------------------

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let devices = state.record_store.list_devices().await?;
    Ok(Json(devices).into_response())
}

pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewDevice>,
) -> Result<Response, ApiError> {
    let device = state.record_store.create_device(new).await?;
    tracing::info!("Device created: {} ({})", device.device_identifier, device.id);
    Ok((StatusCode::CREATED, Json(device)).into_response())
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match state.record_store.get_device(id).await? {
        Some(device) => Ok(Json(device).into_response()),
        None => Err(TrendError::NotFound(format!("Device with id '{}' not found", id)).into()),
    }
}

pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<DeviceUpdate>,
) -> Result<Response, ApiError> {
    let device = state.record_store.update_device(id, update).await?;
    Ok(Json(device).into_response())
}

pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.record_store.delete_device(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Tag-set records
// ---------------------------------------------------------------------------

pub async fn list_tag_sets(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let tag_sets = state.record_store.list_tag_sets().await?;
    Ok(Json(tag_sets).into_response())
}

pub async fn create_tag_set(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewTagSet>,
) -> Result<Response, ApiError> {
    let tag_set = state.record_store.create_tag_set(new).await?;
    tracing::info!("Tag set created: {} ({})", tag_set.name, tag_set.id);
    Ok((StatusCode::CREATED, Json(tag_set)).into_response())
}

pub async fn get_tag_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match state.record_store.get_tag_set(id).await? {
        Some(tag_set) => Ok(Json(tag_set).into_response()),
        None => Err(TrendError::NotFound(format!("Tag set with id '{}' not found", id)).into()),
    }
}

pub async fn update_tag_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<TagSetUpdate>,
) -> Result<Response, ApiError> {
    let tag_set = state.record_store.update_tag_set(id, update).await?;
    Ok(Json(tag_set).into_response())
}

pub async fn delete_tag_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.record_store.delete_tag_set(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

fn default_buffer_threshold() -> usize {
    10
}

/// Start request. The target and tag list come either from stored records
/// (`device_id` / `tag_set_id`) or inline (`device_identifier` + `address` /
/// `tag_list`); inline values win when both are present.
#[derive(Debug, Deserialize)]
pub struct StartTrendRequest {
    pub device_id: Option<Uuid>,
    pub tag_set_id: Option<Uuid>,
    pub device_identifier: Option<String>,
    pub address: Option<String>,
    pub tag_list: Option<Vec<String>>,
    pub description: String,
    pub cycle_count: u64,
    pub cycle_interval_ms: u64,
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,
}

/// Resolve record references and assemble the start parameters. The address
/// and tag list are copied out of the records here; the job never looks at
/// the record store again.
async fn assemble_params(
    state: &AppState,
    req: StartTrendRequest,
) -> Result<TrendParams, ApiError> {
    let (device_identifier, address) = match (req.device_identifier, req.address) {
        (Some(identifier), Some(address)) => (identifier, address),
        (identifier, address) => match req.device_id {
            Some(device_id) => {
                let device = state
                    .record_store
                    .get_device(device_id)
                    .await?
                    .ok_or_else(|| {
                        TrendError::Validation(format!(
                            "device_id '{}' does not match any device",
                            device_id
                        ))
                    })?;
                (
                    identifier.unwrap_or(device.device_identifier),
                    address.unwrap_or(device.address),
                )
            }
            None => {
                return Err(TrendError::Validation(
                    "either device_id or device_identifier and address are required".to_string(),
                )
                .into())
            }
        },
    };

    let tag_list = match req.tag_list {
        Some(tags) => tags,
        None => match req.tag_set_id {
            Some(tag_set_id) => {
                state
                    .record_store
                    .get_tag_set(tag_set_id)
                    .await?
                    .ok_or_else(|| {
                        TrendError::Validation(format!(
                            "tag_set_id '{}' does not match any tag set",
                            tag_set_id
                        ))
                    })?
                    .tags
            }
            None => {
                return Err(TrendError::Validation(
                    "either tag_set_id or tag_list is required".to_string(),
                )
                .into())
            }
        },
    };

    Ok(TrendParams {
        device_identifier,
        description: req.description,
        address,
        tag_list,
        cycle_count: req.cycle_count,
        cycle_interval_ms: req.cycle_interval_ms,
        buffer_threshold: req.buffer_threshold,
    })
}

pub async fn start_trend(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartTrendRequest>,
) -> Result<Response, ApiError> {
    let params = assemble_params(&state, req).await?;
    let snapshot = state.registry.start_job(params).await?;
    Ok((StatusCode::CREATED, Json(snapshot)).into_response())
}

pub async fn list_trends(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    Ok(Json(state.registry.list_jobs().await).into_response())
}

pub async fn get_trend(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match state.registry.get_job(id).await {
        Some(snapshot) => Ok(Json(snapshot).into_response()),
        None => Err(TrendError::NotFound(format!("No trend with id '{}'", id)).into()),
    }
}

pub async fn stop_trend(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.registry.stop_job(id).await?;
    // The stop is asynchronous; the job reports a terminal state later.
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "stopping" }))).into_response())
}

pub async fn delete_trend(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.registry.clear_finished(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

fn default_samples_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct SamplesQuery {
    #[serde(default = "default_samples_limit")]
    pub limit: usize,
}

pub async fn recent_samples(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SamplesQuery>,
) -> Result<Response, ApiError> {
    Ok(Json(state.registry.recent_samples(query.limit)).into_response())
}
