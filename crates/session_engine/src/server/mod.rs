use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::server::endpoints::{holidays, schedule, status};
use crate::types::EngineState;

mod endpoints;
pub mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The engine state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<EngineState>) -> Router {
    let schedule_router = Router::new()
        .route("/schedules", post(schedule::post_create))
        .route("/schedules/preview", post(schedule::post_preview))
        .route(
            "/schedules/:id/sessions",
            get(schedule::get_schedule_sessions).put(schedule::put_regenerate),
        )
        .route("/schedules/:id/status", post(schedule::post_schedule_status))
        .route("/sessions/:id/status", post(schedule::post_session_status))
        .route("/rooms/check", post(schedule::post_room_check));

    let holiday_router = Router::new()
        .route("/holidays/cache_stats", get(holidays::get_cache_stats))
        .route("/holidays/invalidate_cache", post(holidays::invalidate_cache))
        .route("/holidays/:year", get(holidays::get_holidays));

    Router::new()
        .route("/health", get(status::get_health))
        .merge(schedule_router)
        .merge(holiday_router)
        .with_state(app_state)
}
