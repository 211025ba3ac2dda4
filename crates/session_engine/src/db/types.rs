/// Database types for schedules and sessions
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::schedule::{
    GeneratedSession, GroupedConflicts, ScheduleDefinition, ScheduleKind, ScheduleStatus, SessionStatus,
};

#[derive(Debug, Clone, Serialize)]
pub struct DbSchedule {
    pub schedule_id: i64,
    pub name: String,
    pub kind: ScheduleKind,
    pub status: ScheduleStatus,
    pub definition: ScheduleDefinition,
    pub estimated_end_date: Option<NaiveDate>,
    pub fingerprint: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbSession {
    pub session_id: i64,
    pub schedule_id: i64,
    pub session_number: u32,
    pub week_number: u32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SessionStatus,
    pub is_makeup: bool,
    pub makeup_for_session_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub room_id: Option<i64>,
    pub notes: Option<String>,
    pub superseded: bool,
}

impl DbSession {
    pub fn to_generated(&self) -> GeneratedSession {
        GeneratedSession {
            session_number: self.session_number,
            week_number: self.week_number,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            is_makeup: self.is_makeup,
            teacher_id: self.teacher_id,
            room_id: self.room_id,
            notes: self.notes.clone(),
        }
    }
}

/// A persisted session that still holds a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSession {
    pub session_id: i64,
    pub schedule_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Student,
    Participant,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Student => "student",
            ParticipantRole::Participant => "participant",
        }
    }
}

/// A schedule about to be written together with its sessions.
#[derive(Debug, Clone)]
pub struct NewSchedule<'a> {
    pub definition: &'a ScheduleDefinition,
    pub status: ScheduleStatus,
    pub participants: &'a [i64],
    pub role: ParticipantRole,
    pub estimated_end_date: NaiveDate,
    pub fingerprint: &'a str,
}

/// Result of a guarded write.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// `id` is the schedule id, or the make-up session id for reschedules
    Committed {
        id: i64,
        version: i64,
        conflicts: GroupedConflicts,
    },
    /// Blocking conflicts found inside the transaction; nothing was written
    Rejected(GroupedConflicts),
    /// The row changed since it was read; nothing was written
    Stale,
}
