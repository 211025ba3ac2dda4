use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::types::EngineState;

/// GET /health
pub async fn get_health(State(s): State<Arc<EngineState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": s.started_at.elapsed().as_secs(),
            "holiday_country": s.config.holidays.country_code,
        })),
    )
        .into_response()
}
