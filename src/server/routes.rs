//! REST handlers for container management.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{ContainerDto, ContainerStats, CreateContainerRequest};

use super::error::ApiError;
use super::extract::OwnerId;
use super::AppState;

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

pub async fn create_container(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(request): Json<CreateContainerRequest>,
) -> Result<(StatusCode, Json<ContainerDto>), ApiError> {
    let container = state.service.create(owner_id, request).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

pub async fn list_containers(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<ContainerDto>>, ApiError> {
    Ok(Json(state.service.list(owner_id).await?))
}

pub async fn get_container(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<i64>,
) -> Result<Json<ContainerDto>, ApiError> {
    Ok(Json(state.service.get(id, owner_id).await?))
}

pub async fn start_container(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<i64>,
) -> Result<Json<ContainerDto>, ApiError> {
    Ok(Json(state.service.start(id, owner_id).await?))
}

pub async fn stop_container(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<i64>,
) -> Result<Json<ContainerDto>, ApiError> {
    Ok(Json(state.service.stop(id, owner_id).await?))
}

pub async fn delete_container(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.service.delete(id, owner_id).await?;
    Ok(Json(MessageResponse::success("Container deleted successfully")))
}

pub async fn container_logs(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let lines = query
        .lines
        .unwrap_or(state.service.config().default_log_lines);
    Ok(Json(state.service.logs(id, owner_id, lines).await?))
}

pub async fn allowed_images(State(state): State<AppState>, _owner: OwnerId) -> Json<Vec<String>> {
    Json(state.service.allowed_images())
}

pub async fn container_stats(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<ContainerStats>, ApiError> {
    Ok(Json(state.service.stats(owner_id).await?))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn metrics() -> String {
    crate::metrics::metrics_handler().await
}
