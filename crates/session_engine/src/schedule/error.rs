//! Error types for schedule planning and persistence.

use chrono::NaiveTime;
use thiserror::Error;

use super::types::{GroupedConflicts, ScheduleStatus, SessionStatus};
use crate::db::StoreError;

/// Errors that can occur while planning, validating or committing a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// `total_hours / hours_per_session` produced no sessions
    #[error("Invalid duration: {total_hours}h total with {hours_per_session}h per session yields no sessions")]
    InvalidDuration {
        total_hours: f64,
        hours_per_session: f64,
    },

    /// Explicit slots don't match `sessions_per_week`
    #[error("Expected {expected} session slots per week, got {actual}")]
    SlotCountMismatch { expected: u32, actual: usize },

    /// Two explicit slots share a weekday
    #[error("Weekday {weekday} appears in more than one session slot")]
    DuplicateSlotWeekday { weekday: u8 },

    /// Slot fields are out of range
    #[error("Invalid session slot: {message}")]
    InvalidSlot { message: String },

    /// Legacy patterns need a daily start time
    #[error("Schedule has neither session slots nor a start time")]
    MissingStartTime,

    /// Slot falls outside the branch operating window
    #[error("Slot on weekday {weekday} at {start_time} (ending {end_time}) is outside operating hours {open}-{close}")]
    OutOfOperatingHours {
        weekday: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
        open: NaiveTime,
        close: NaiveTime,
    },

    /// Generation hit the day cap before producing every session
    #[error("Generated {generated} of {required} sessions within {max_days} days")]
    UnboundedGeneration {
        generated: u32,
        required: u32,
        max_days: i64,
    },

    /// Creation aborted because of resource conflicts
    #[error("{} conflicting session(s) detected", .0.total())]
    ConflictsDetected(GroupedConflicts),

    /// Plan computed at create time differs from the previewed one
    #[error("Plan fingerprint {actual} does not match previewed fingerprint {expected}")]
    PreviewMismatch { expected: String, actual: String },

    /// Class schedule references a group with no members
    #[error("Group {group_id} has no members")]
    MissingGroup { group_id: i64 },

    /// Status change not permitted by the lifecycle
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Rescheduling a session needs the make-up date and time
    #[error("Rescheduling session {session_id} requires a make-up date and start time")]
    MakeupSlotRequired { session_id: i64 },

    /// Optimistic concurrency check failed
    #[error("Schedule {schedule_id} is at version {actual}, expected {expected}")]
    VersionMismatch {
        schedule_id: i64,
        expected: i64,
        actual: i64,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ScheduleError {
    /// Machine-readable code used in preview issues and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::InvalidDuration { .. } => "INVALID_DURATION",
            ScheduleError::SlotCountMismatch { .. } => "SLOT_COUNT_MISMATCH",
            ScheduleError::DuplicateSlotWeekday { .. } => "DUPLICATE_SLOT_WEEKDAY",
            ScheduleError::InvalidSlot { .. } => "INVALID_SLOT",
            ScheduleError::MissingStartTime => "MISSING_START_TIME",
            ScheduleError::OutOfOperatingHours { .. } => "OUT_OF_OPERATING_HOURS",
            ScheduleError::UnboundedGeneration { .. } => "UNBOUNDED_GENERATION",
            ScheduleError::ConflictsDetected(_) => "CONFLICTS_DETECTED",
            ScheduleError::PreviewMismatch { .. } => "PREVIEW_MISMATCH",
            ScheduleError::MissingGroup { .. } => "MISSING_GROUP",
            ScheduleError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ScheduleError::MakeupSlotRequired { .. } => "MAKEUP_SLOT_REQUIRED",
            ScheduleError::VersionMismatch { .. } => "VERSION_MISMATCH",
            ScheduleError::NotFound { .. } => "NOT_FOUND",
            ScheduleError::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns true for rejections of the request itself, as opposed to
    /// store failures or state conflicts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScheduleError::InvalidDuration { .. }
                | ScheduleError::SlotCountMismatch { .. }
                | ScheduleError::DuplicateSlotWeekday { .. }
                | ScheduleError::InvalidSlot { .. }
                | ScheduleError::MissingStartTime
                | ScheduleError::OutOfOperatingHours { .. }
                | ScheduleError::UnboundedGeneration { .. }
                | ScheduleError::MissingGroup { .. }
                | ScheduleError::MakeupSlotRequired { .. }
        )
    }

    pub fn schedule_transition(from: ScheduleStatus, to: ScheduleStatus) -> Self {
        ScheduleError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    pub fn session_transition(from: SessionStatus, to: SessionStatus) -> Self {
        ScheduleError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

