use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::Utc;
use tracing::{info, instrument, Span};

use azsnap_arm::Snapshot;
use azsnap_common::{
    CreateSnapshotRequest, DeleteSnapshotRequest, GatewayError, HealthResponse, MessageResponse,
    SnapshotsByAgeQuery, SnapshotsByAgeResponse, ValidateSnapshotQuery,
};

use crate::age::collect_older_than;
use crate::error::{upstream, ApiError};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError(GatewayError::Validation(format!(
        "Invalid request: {}",
        rejection.body_text()
    )))
}

fn invalid_query(rejection: QueryRejection) -> ApiError {
    ApiError(GatewayError::Validation(format!(
        "Invalid query: {}",
        rejection.body_text()
    )))
}

#[instrument(skip_all)]
pub async fn login_handler(State(state): State<AppState>) -> ApiResult<MessageResponse> {
    let credential = state
        .identity
        .login()
        .await
        .map_err(|e| upstream("Failed to login to Azure", e))?;

    state.credentials.set(credential).await;
    info!("logged in to Azure");
    Ok(Json(MessageResponse::new("Logged in to Azure successfully.")))
}

#[instrument(skip_all, fields(resource_group, snapshot))]
pub async fn create_snapshot_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateSnapshotRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let credential = state.credentials.require().await?;
    let Json(req) = payload.map_err(invalid_body)?;
    Span::current()
        .record("resource_group", req.resource_group_name.as_str())
        .record("snapshot", req.snapshot_name.as_str());

    let client = state.connect(credential)?;
    let snapshot = Snapshot::copy_of(req.disk_id, req.location);

    let mut operation = client
        .begin_create_or_update(&req.resource_group_name, &req.snapshot_name, snapshot)
        .await
        .map_err(|e| upstream("Failed to initiate snapshot creation", e))?;
    operation
        .poll_until_done()
        .await
        .map_err(|e| upstream("Failed to create snapshot", e))?;

    info!("snapshot created");
    Ok(Json(MessageResponse::new("Snapshot created successfully.")))
}

#[instrument(skip_all, fields(resource_group, snapshot))]
pub async fn delete_snapshot_handler(
    State(state): State<AppState>,
    payload: Result<Json<DeleteSnapshotRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let credential = state.credentials.require().await?;
    let Json(req) = payload.map_err(invalid_body)?;
    Span::current()
        .record("resource_group", req.resource_group_name.as_str())
        .record("snapshot", req.snapshot_name.as_str());

    let client = state.connect(credential)?;

    let mut operation = client
        .begin_delete(&req.resource_group_name, &req.snapshot_name)
        .await
        .map_err(|e| upstream("Failed to initiate snapshot deletion", e))?;
    operation
        .poll_until_done()
        .await
        .map_err(|e| upstream("Failed to delete snapshot", e))?;

    info!("snapshot deleted");
    Ok(Json(MessageResponse::new("Snapshot deleted successfully.")))
}

/// Existence check. Every lookup failure is reported as 404.
#[instrument(skip_all, fields(resource_group, snapshot))]
pub async fn validate_snapshot_handler(
    State(state): State<AppState>,
    query: Result<Query<ValidateSnapshotQuery>, QueryRejection>,
) -> ApiResult<MessageResponse> {
    let credential = state.credentials.require().await?;
    let Query(query) = query.map_err(invalid_query)?;
    let (resource_group, name) = query.require()?;
    Span::current()
        .record("resource_group", resource_group.as_str())
        .record("snapshot", name.as_str());

    let client = state.connect(credential)?;
    client
        .get(&resource_group, &name)
        .await
        .map_err(|e| ApiError(GatewayError::NotFound(format!("Snapshot not found: {e}"))))?;

    Ok(Json(MessageResponse::new("Snapshot is valid and exists.")))
}

#[instrument(skip_all, fields(days))]
pub async fn snapshots_by_age_handler(
    State(state): State<AppState>,
    query: Result<Query<SnapshotsByAgeQuery>, QueryRejection>,
) -> ApiResult<SnapshotsByAgeResponse> {
    let credential = state.credentials.require().await?;
    let Query(query) = query.map_err(invalid_query)?;
    let days = query.days()?;
    Span::current().record("days", days);

    let client = state.connect(credential)?;
    let snapshots = collect_older_than(client.as_ref(), days, Utc::now())
        .await
        .map_err(|e| upstream("Failed to list snapshots", e))?;

    info!(days, matched = snapshots.len(), "listed snapshots by age");
    Ok(Json(SnapshotsByAgeResponse { snapshots }))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}
