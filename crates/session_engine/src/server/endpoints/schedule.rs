//! Endpoints for planning, creating and updating schedules.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::schedule::{
    CreateOptions, RegenerateOptions, RoomCheckRequest, ScheduleDefinition, ScheduleError, ScheduleStatus,
    SessionTransition,
};
use crate::server::types::ApiErrorType;
use crate::types::EngineState;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub definition: ScheduleDefinition,
    #[serde(default)]
    pub options: CreateOptions,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub definition: ScheduleDefinition,
    pub options: RegenerateOptions,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ScheduleStatus,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub include_superseded: bool,
}

fn error_response(e: ScheduleError) -> Response {
    if matches!(e, ScheduleError::Store(_)) {
        error!(error = %e, "Schedule request failed");
    }
    ApiErrorType::from(e).into_response()
}

/// POST /schedules/preview
pub async fn post_preview(State(s): State<Arc<EngineState>>, Json(definition): Json<ScheduleDefinition>) -> Response {
    info!("POST /schedules/preview ({})", definition.name);

    match s.service.preview(&definition).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /schedules
///
/// Responds 409 with the grouped conflicts unless `options.allow_conflicts` is set.
pub async fn post_create(State(s): State<Arc<EngineState>>, Json(req): Json<CreateRequest>) -> Response {
    info!("POST /schedules ({})", req.definition.name);

    match s.service.create(&req.definition, &req.options).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /schedules/:id/sessions
pub async fn put_regenerate(
    Path(schedule_id): Path<i64>,
    State(s): State<Arc<EngineState>>,
    Json(req): Json<RegenerateRequest>,
) -> Response {
    info!("PUT /schedules/{}/sessions", schedule_id);

    match s.service.regenerate(schedule_id, &req.definition, &req.options).await {
        Ok(regenerated) => (StatusCode::OK, Json(regenerated)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /schedules/:id/status
pub async fn post_schedule_status(
    Path(schedule_id): Path<i64>,
    State(s): State<Arc<EngineState>>,
    Json(req): Json<StatusRequest>,
) -> Response {
    info!("POST /schedules/{}/status -> {}", schedule_id, req.status.as_str());

    match s.service.transition_schedule(schedule_id, req.status) {
        Ok(schedule) => (StatusCode::OK, Json(schedule)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /schedules/:id/sessions
pub async fn get_schedule_sessions(
    Path(schedule_id): Path<i64>,
    State(s): State<Arc<EngineState>>,
    Query(params): Query<SessionsQuery>,
) -> Response {
    info!("GET /schedules/{}/sessions", schedule_id);

    match s.service.sessions(schedule_id, params.include_superseded) {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /sessions/:id/status
///
/// Moving to `rescheduled` requires `makeup_date` and `makeup_start_time`
/// and creates the make-up session.
pub async fn post_session_status(
    Path(session_id): Path<i64>,
    State(s): State<Arc<EngineState>>,
    Json(req): Json<SessionTransition>,
) -> Response {
    info!("POST /sessions/{}/status -> {}", session_id, req.status.as_str());

    match s.service.transition_session(session_id, &req) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /rooms/check
pub async fn post_room_check(State(s): State<Arc<EngineState>>, Json(req): Json<RoomCheckRequest>) -> Response {
    info!("POST /rooms/check (room {} on {})", req.room_id, req.date);

    match s.service.check_room(&req) {
        Ok(check) => (StatusCode::OK, Json(check)).into_response(),
        Err(e) => error_response(e),
    }
}
