//! Holiday lookup and cache management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::holiday::HolidayError;
use crate::server::types::ApiErrorType;
use crate::types::EngineState;

#[derive(Debug, Deserialize)]
pub struct InvalidateParams {
    /// Only drop this year; everything when absent
    pub year: Option<i32>,
}

fn holiday_error_to_response(error: HolidayError) -> Response {
    let (status, message) = match &error {
        HolidayError::CircuitBreakerOpen => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Holiday provider temporarily unavailable due to repeated failures",
        ),
        HolidayError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "Holiday provider timed out"),
        HolidayError::Url { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Holiday provider misconfigured"),
        _ => (StatusCode::BAD_GATEWAY, "Failed to fetch holidays"),
    };

    ApiErrorType::from((status, message, Some(error.to_string()))).into_response()
}

/// GET /holidays/:year
pub async fn get_holidays(Path(year): Path<i32>, State(s): State<Arc<EngineState>>) -> Response {
    info!("GET /holidays/{}", year);

    match s.holiday_client.fetch_year(year).await {
        Ok(calendar) => (
            StatusCode::OK,
            Json(json!({
                "year": year,
                "country": s.holiday_client.config().country_code,
                "holidays": calendar.entries(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(year, error = %e, "Holiday lookup failed");
            holiday_error_to_response(e)
        }
    }
}

/// GET /holidays/cache_stats
pub async fn get_cache_stats(State(s): State<Arc<EngineState>>) -> Response {
    (StatusCode::OK, Json(s.holiday_client.cache_stats())).into_response()
}

/// POST /holidays/invalidate_cache
pub async fn invalidate_cache(State(s): State<Arc<EngineState>>, Query(params): Query<InvalidateParams>) -> Response {
    match params.year {
        Some(year) => {
            info!(year, "Invalidating cached holidays for year");
            s.holiday_client.invalidate_year(year);
        }
        None => {
            info!("Clearing holiday cache");
            s.holiday_client.clear_cache();
        }
    }

    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}
