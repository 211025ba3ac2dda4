//! Status transitions for schedules and their sessions.
//!
//! Schedules: `assigned -> scheduled -> {paused, completed, cancelled}`, with
//! a paused schedule allowed to resume or be cancelled.
//!
//! Sessions: `assigned|scheduled -> confirmed -> completed`, and `cancelled`,
//! `rescheduled` or `no-show` from any state before completion. Terminal
//! states never change again; a rescheduled session is replaced by a
//! make-up session rather than edited.

use super::error::ScheduleError;
use super::types::{ScheduleKind, ScheduleStatus, SessionStatus};

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Assigned => "assigned",
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(ScheduleStatus::Assigned),
            "scheduled" => Some(ScheduleStatus::Scheduled),
            "paused" => Some(ScheduleStatus::Paused),
            "completed" => Some(ScheduleStatus::Completed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    /// Every schedule waits for confirmation: the teacher for classes, the
    /// organizer or participants otherwise.
    pub fn initial(_kind: ScheduleKind) -> Self {
        ScheduleStatus::Assigned
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }

    pub fn can_transition_to(&self, to: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, to),
            (Assigned, Scheduled)
                | (Assigned, Cancelled)
                | (Scheduled, Paused)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (Paused, Scheduled)
                | (Paused, Cancelled)
        )
    }

    pub fn transition(self, to: ScheduleStatus) -> Result<ScheduleStatus, ScheduleError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ScheduleError::schedule_transition(self, to))
        }
    }

    /// Sessions may only be regenerated while the schedule is live.
    pub fn allows_regeneration(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Assigned | ScheduleStatus::Scheduled | ScheduleStatus::Paused
        )
    }
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 7] = [
        SessionStatus::Assigned,
        SessionStatus::Scheduled,
        SessionStatus::Confirmed,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
        SessionStatus::Rescheduled,
        SessionStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Assigned => "assigned",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Rescheduled => "rescheduled",
            SessionStatus::NoShow => "no-show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(SessionStatus::Assigned),
            "scheduled" => Some(SessionStatus::Scheduled),
            "confirmed" => Some(SessionStatus::Confirmed),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            "rescheduled" => Some(SessionStatus::Rescheduled),
            "no-show" => Some(SessionStatus::NoShow),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Cancelled
                | SessionStatus::Rescheduled
                | SessionStatus::NoShow
        )
    }

    /// Whether a session in this state still occupies its room, teacher and participants.
    pub fn holds_resources(&self) -> bool {
        !matches!(
            self,
            SessionStatus::Cancelled | SessionStatus::NoShow | SessionStatus::Rescheduled
        )
    }

    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Assigned, Scheduled) => true,
            (Assigned | Scheduled, Confirmed) => true,
            (Confirmed, Completed) => true,
            (Assigned | Scheduled | Confirmed, Cancelled | Rescheduled | NoShow) => true,
            _ => false,
        }
    }

    pub fn transition(self, to: SessionStatus) -> Result<SessionStatus, ScheduleError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ScheduleError::session_transition(self, to))
        }
    }
}

/// SQL list of statuses that no longer hold resources, for `NOT IN (...)`.
pub(crate) fn released_statuses_sql() -> String {
    SessionStatus::ALL
        .iter()
        .filter(|status| !status.holds_resources())
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
