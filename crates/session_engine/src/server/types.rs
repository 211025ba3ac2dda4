use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::schedule::{GroupedConflicts, ScheduleError};

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiErrorType {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<GroupedConflicts>,
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, context): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            error: error.to_string(),
            code: None,
            context,
            conflicts: None,
        }
    }
}

impl From<ScheduleError> for ApiErrorType {
    fn from(error: ScheduleError) -> Self {
        let status = schedule_error_status(&error);
        let message = match &error {
            ScheduleError::ConflictsDetected(_) => "Schedule conflicts with existing sessions",
            ScheduleError::PreviewMismatch { .. } => "Plan changed since preview",
            ScheduleError::VersionMismatch { .. } => "Schedule was modified concurrently",
            ScheduleError::InvalidTransition { .. } => "Status change not allowed",
            ScheduleError::NotFound { .. } => "Not found",
            ScheduleError::Store(_) => "Internal storage error",
            _ => "Invalid schedule request",
        };

        Self {
            status,
            error: message.to_string(),
            code: Some(error.code()),
            context: Some(error.to_string()),
            conflicts: match error {
                ScheduleError::ConflictsDetected(conflicts) => Some(conflicts),
                _ => None,
            },
        }
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

pub fn schedule_error_status(error: &ScheduleError) -> StatusCode {
    match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        ScheduleError::ConflictsDetected(_)
        | ScheduleError::PreviewMismatch { .. }
        | ScheduleError::VersionMismatch { .. }
        | ScheduleError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScheduleStatus, SessionStatus};

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            schedule_error_status(&ScheduleError::SlotCountMismatch { expected: 3, actual: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            schedule_error_status(&ScheduleError::ConflictsDetected(GroupedConflicts::default())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            schedule_error_status(&ScheduleError::schedule_transition(
                ScheduleStatus::Completed,
                ScheduleStatus::Scheduled
            )),
            StatusCode::CONFLICT
        );
        assert_eq!(
            schedule_error_status(&ScheduleError::NotFound { entity: "session", id: 9 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            schedule_error_status(&ScheduleError::session_transition(
                SessionStatus::Completed,
                SessionStatus::Cancelled
            )),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_conflict_body_carries_conflicts() {
        let body = ApiErrorType::from(ScheduleError::ConflictsDetected(GroupedConflicts::default()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "CONFLICTS_DETECTED");
        assert!(json["conflicts"]["room"].as_array().unwrap().is_empty());
        assert!(json.get("status").is_none());
    }
}
