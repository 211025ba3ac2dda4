/// Types describing schedules, their generated sessions and the reports built around them
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// The kind of a schedule, without the data used to resolve participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Class,
    Meeting,
    Event,
    Holiday,
    Appointment,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Class => "class",
            ScheduleKind::Meeting => "meeting",
            ScheduleKind::Event => "event",
            ScheduleKind::Holiday => "holiday",
            ScheduleKind::Appointment => "appointment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(ScheduleKind::Class),
            "meeting" => Some(ScheduleKind::Meeting),
            "event" => Some(ScheduleKind::Event),
            "holiday" => Some(ScheduleKind::Holiday),
            "appointment" => Some(ScheduleKind::Appointment),
            _ => None,
        }
    }
}

/// Who a schedule is for.
///
/// Class schedules are owned by a group whose members are looked up at
/// planning time; every other kind carries its participant list inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Class {
        group_id: i64,
    },
    Meeting {
        #[serde(default)]
        participants: Vec<i64>,
    },
    Event {
        #[serde(default)]
        participants: Vec<i64>,
    },
    Holiday {
        #[serde(default)]
        participants: Vec<i64>,
    },
    Appointment {
        #[serde(default)]
        participants: Vec<i64>,
    },
}

impl ScheduleTarget {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            ScheduleTarget::Class { .. } => ScheduleKind::Class,
            ScheduleTarget::Meeting { .. } => ScheduleKind::Meeting,
            ScheduleTarget::Event { .. } => ScheduleKind::Event,
            ScheduleTarget::Holiday { .. } => ScheduleKind::Holiday,
            ScheduleTarget::Appointment { .. } => ScheduleKind::Appointment,
        }
    }

    pub fn group_id(&self) -> Option<i64> {
        match self {
            ScheduleTarget::Class { group_id } => Some(*group_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Custom,
    #[serde(rename = "none")]
    Once,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::BiWeekly => "bi-weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Custom => "custom",
            RecurrencePattern::Once => "none",
        }
    }
}

/// An explicit weekday + start time pairing. Weekday 0 is Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionSlot {
    pub weekday: u8,
    pub start_hour: u8,
    pub start_minute: u8,
}

impl SessionSlot {
    pub fn new(weekday: u8, start_hour: u8, start_minute: u8) -> Self {
        Self {
            weekday,
            start_hour,
            start_minute,
        }
    }

    pub fn from_parts(weekday: Weekday, start: NaiveTime) -> Self {
        use chrono::Timelike;
        Self {
            weekday: weekday.num_days_from_monday() as u8,
            start_hour: start.hour() as u8,
            start_minute: start.minute() as u8,
        }
    }

    /// `None` if the hour/minute pair is not a valid time of day.
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.start_hour as u32, self.start_minute as u32, 0)
    }

    pub fn start_minutes(&self) -> u32 {
        self.start_hour as u32 * 60 + self.start_minute as u32
    }
}

/// A recurring-session plan as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub name: String,
    pub target: ScheduleTarget,
    pub pattern: RecurrencePattern,
    pub total_hours: f64,
    pub hours_per_session: f64,
    pub sessions_per_week: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub estimated_end_date: Option<NaiveDate>,
    /// Legacy single daily start time, used when `slots` is empty
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub slots: Vec<SessionSlot>,
    #[serde(default)]
    pub teacher_id: Option<i64>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default = "default_true")]
    pub auto_reschedule: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduleDefinition {
    pub fn kind(&self) -> ScheduleKind {
        self.target.kind()
    }

    /// Session length in whole minutes.
    pub fn session_minutes(&self) -> i64 {
        (self.hours_per_session * 60.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Assigned,
    Scheduled,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Assigned,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
    NoShow,
}

/// One concrete dated occurrence of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSession {
    pub session_number: u32,
    pub week_number: u32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SessionStatus,
    pub is_makeup: bool,
    pub teacher_id: Option<i64>,
    pub room_id: Option<i64>,
    pub notes: Option<String>,
}

impl GeneratedSession {
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayImpact {
    /// Number of the session before rescheduling
    pub session_number: u32,
    pub date: NaiveDate,
    pub holiday_name: String,
    pub shifted_to: Option<NaiveDate>,
    /// Number of the moved session after re-indexing
    pub new_session_number: Option<u32>,
    pub was_rescheduled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Room,
    Teacher,
    Participant,
    Student,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Room => "room",
            ResourceType::Teacher => "teacher",
            ResourceType::Participant => "participant",
            ResourceType::Student => "student",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub existing_schedule_id: i64,
    pub existing_session_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// The candidate session that collides
    pub session_number: u32,
}

/// Conflicts grouped by the resource they collide on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedConflicts {
    pub room: Vec<ConflictRecord>,
    pub teacher: Vec<ConflictRecord>,
    pub participant: Vec<ConflictRecord>,
    pub student: Vec<ConflictRecord>,
}

impl GroupedConflicts {
    pub fn push(&mut self, record: ConflictRecord) {
        match record.resource_type {
            ResourceType::Room => self.room.push(record),
            ResourceType::Teacher => self.teacher.push(record),
            ResourceType::Participant => self.participant.push(record),
            ResourceType::Student => self.student.push(record),
        }
    }

    pub fn total(&self) -> usize {
        self.room.len() + self.teacher.len() + self.participant.len() + self.student.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Room, teacher and participant collisions block creation; students
    /// double-booked across classes are only reported.
    pub fn has_blocking(&self) -> bool {
        !self.room.is_empty() || !self.teacher.is_empty() || !self.participant.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl Issue {
    pub fn error(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code: code.to_string(),
            message: message.into(),
            details,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code: code.to_string(),
            message: message.into(),
            details,
        }
    }
}

/// Billing summary for class schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub group_id: i64,
    pub eligible_students: Vec<i64>,
    pub billable_sessions: u32,
    pub billable_hours: f64,
    pub hours_per_student: f64,
}

/// Readiness report returned by a preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewReport {
    pub can_create: bool,
    pub issues: Vec<Issue>,
    pub original_sessions: Vec<GeneratedSession>,
    pub final_sessions: Vec<GeneratedSession>,
    pub holiday_impacts: Vec<HolidayImpact>,
    pub conflicts: GroupedConflicts,
    pub conflicts_before_adjustment: GroupedConflicts,
    pub estimated_end_date: Option<NaiveDate>,
    pub payment: Option<PaymentSummary>,
    pub fingerprint: Option<String>,
}

/// Result of a successful create or regenerate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSchedule {
    pub schedule_id: i64,
    pub version: i64,
    pub status: ScheduleStatus,
    pub final_sessions: Vec<GeneratedSession>,
    pub original_sessions: Vec<GeneratedSession>,
    pub holiday_impacts: Vec<HolidayImpact>,
    pub conflicts: GroupedConflicts,
    pub estimated_end_date: NaiveDate,
    pub fingerprint: String,
}

/// `1 + floor(days_since_start / 7)`
pub fn week_number(start_date: NaiveDate, date: NaiveDate) -> u32 {
    let days = (date - start_date).num_days().max(0);
    (days / 7) as u32 + 1
}
