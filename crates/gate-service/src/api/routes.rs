use crate::error::GateError;
use crate::state::GateServiceState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use common::access::{
    GateDecision, IdentityListResponse, RegisterIdentityRequest, RegisterVehicleRequest,
    RegistrationOutcome, SessionInfo, SessionStartRequest, SessionStartResponse, SessionSummary,
    VehicleListResponse, VideoFrame,
};
use common::validation;
use serde::Deserialize;
use serde_json::json;

/// Start a monitoring session
pub async fn start_session(
    State(state): State<GateServiceState>,
    Json(request): Json<SessionStartRequest>,
) -> Result<Json<SessionStartResponse>, GateError> {
    let session = state.engine().start_session(request.duration_secs).await?;
    Ok(Json(SessionStartResponse {
        accepted: true,
        session_id: Some(session.id),
        deadline: Some(session.deadline),
        message: Some("gate session started".to_string()),
    }))
}

/// Process one frame within a session
pub async fn submit_frame(
    State(state): State<GateServiceState>,
    Path(session_id): Path<String>,
    Json(frame): Json<VideoFrame>,
) -> Result<Json<GateDecision>, GateError> {
    let decision = state.engine().process_frame(&session_id, &frame).await?;
    Ok(Json(decision))
}

/// End a session and return its summary
pub async fn end_session(
    State(state): State<GateServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, GateError> {
    let summary = state.engine().end_session(&session_id).await?;
    Ok(Json(summary))
}

/// Snapshot of one session
pub async fn get_session(
    State(state): State<GateServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, GateError> {
    let session = state
        .engine()
        .sessions()
        .snapshot(&session_id)
        .await
        .ok_or(GateError::SessionNotFound(session_id))?;
    Ok(Json(session.info()))
}

/// List running sessions
pub async fn list_sessions(State(state): State<GateServiceState>) -> impl IntoResponse {
    let sessions: Vec<SessionInfo> = state
        .engine()
        .sessions()
        .list()
        .await
        .iter()
        .map(|session| session.info())
        .collect();
    (StatusCode::OK, Json(json!({ "sessions": sessions })))
}

/// Register a vehicle plate. A duplicate is a non-error outcome.
pub async fn register_vehicle(
    State(state): State<GateServiceState>,
    Json(request): Json<RegisterVehicleRequest>,
) -> Result<Json<RegistrationOutcome>, GateError> {
    let plate = validation::normalize_plate(&request.plate);
    validation::validate_plate(&plate).map_err(|e| GateError::InvalidRequest(e.to_string()))?;

    let outcome = state.registry().register(&plate).await?;
    Ok(Json(outcome))
}

/// List registered vehicles
pub async fn list_vehicles(
    State(state): State<GateServiceState>,
) -> Result<Json<VehicleListResponse>, GateError> {
    let vehicles = state.registry().list().await?;
    Ok(Json(VehicleListResponse { vehicles }))
}

/// Remove a registered vehicle
pub async fn remove_vehicle(
    State(state): State<GateServiceState>,
    Path(plate): Path<String>,
) -> Result<impl IntoResponse, GateError> {
    let removed = state.registry().remove(&plate).await?;
    Ok((StatusCode::OK, Json(json!({ "removed": removed }))))
}

/// Register a person
pub async fn register_identity(
    State(state): State<GateServiceState>,
    Json(request): Json<RegisterIdentityRequest>,
) -> Result<impl IntoResponse, GateError> {
    validation::validate_name(&request.name)
        .and_then(|_| validation::validate_external_id(&request.external_id))
        .and_then(|_| validation::validate_email(&request.email))
        .map_err(|e| GateError::InvalidRequest(e.to_string()))?;

    let identity = state
        .directory()
        .add_identity(&request.name, &request.external_id, &request.email)
        .await?;
    Ok((StatusCode::OK, Json(identity)))
}

/// Derived counter: granted attempts recorded for an identity
pub async fn identity_access_count(
    State(state): State<GateServiceState>,
    Path(identity_id): Path<u32>,
) -> Result<impl IntoResponse, GateError> {
    let count = state.log().access_count(identity_id).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "identity_id": identity_id, "access_count": count })),
    ))
}

/// List registered identities
pub async fn list_identities(
    State(state): State<GateServiceState>,
) -> Result<Json<IdentityListResponse>, GateError> {
    let identities = state.directory().list_identities().await?;
    Ok(Json(IdentityListResponse { identities }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

/// Recent attempt records, newest last
pub async fn attempt_history(
    State(state): State<GateServiceState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, GateError> {
    let attempts = state
        .log()
        .recent_attempts(params.limit.unwrap_or(50))
        .await?;
    Ok((StatusCode::OK, Json(json!({ "attempts": attempts }))))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "gate-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<GateServiceState>) -> impl IntoResponse {
    if state.engine().ready() {
        (
            StatusCode::OK,
            Json(json!({ "status": "ready" })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "reason": "face recognition model is not trained"
            })),
        )
    }
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry::metrics::gather(),
    )
}
