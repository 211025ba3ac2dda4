//! Entry points for callers: preview, create, regenerate, status changes
//! and ad-hoc room checks.

use chrono::{Datelike, NaiveDate, NaiveTime};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::conflict::{ConflictCandidate, ConflictDetector};
use super::error::ScheduleError;
use super::planner::{initial_session_status, session_end};
use super::preview::{participant_type, PreviewAssembler};
use super::types::*;
use crate::db::{CommitOutcome, DbSchedule, DbSession, NewSchedule, SessionStore};

/// Options for creating a schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Persist even when room, teacher or participant conflicts exist
    pub allow_conflicts: bool,
    /// Fingerprint returned by an earlier preview
    pub expected_fingerprint: Option<String>,
}

/// Options for regenerating an existing schedule's sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerateOptions {
    pub expected_version: i64,
    #[serde(default)]
    pub allow_conflicts: bool,
    #[serde(default)]
    pub expected_fingerprint: Option<String>,
}

/// A requested status change for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub status: SessionStatus,
    #[serde(default)]
    pub note: Option<String>,
    /// Required when `status` is `rescheduled`
    #[serde(default)]
    pub makeup_date: Option<NaiveDate>,
    #[serde(default)]
    pub makeup_start_time: Option<NaiveTime>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub teacher_id: Option<i64>,
    #[serde(default)]
    pub allow_conflicts: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTransitionResult {
    pub session: DbSession,
    pub makeup: Option<DbSession>,
    pub conflicts: GroupedConflicts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCheckRequest {
    pub room_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub exclude_schedule_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCheck {
    pub available: bool,
    pub within_operating_hours: bool,
    pub hours_issue: Option<String>,
    pub conflicts: Vec<ConflictRecord>,
}

pub struct ScheduleService {
    assembler: PreviewAssembler,
    store: Arc<SessionStore>,
    /// Per-schedule locks serializing regeneration
    schedule_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ScheduleService {
    pub fn new(assembler: PreviewAssembler) -> Self {
        let store = assembler.store().clone();
        Self {
            assembler,
            store,
            schedule_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn schedule_lock(&self, schedule_id: i64) -> Arc<Mutex<()>> {
        self.schedule_locks
            .entry(schedule_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read-only readiness report for a definition.
    pub async fn preview(&self, definition: &ScheduleDefinition) -> Result<PreviewReport, ScheduleError> {
        let correlation_id = generate_correlation_id();
        info!(
            correlation_id = %correlation_id,
            kind = definition.kind().as_str(),
            pattern = definition.pattern.as_str(),
            "Previewing schedule"
        );
        self.assembler.preview(definition, None, &correlation_id).await
    }

    /// Generates and persists a schedule with its sessions.
    pub async fn create(
        &self,
        definition: &ScheduleDefinition,
        options: &CreateOptions,
    ) -> Result<CreatedSchedule, ScheduleError> {
        let correlation_id = generate_correlation_id();
        let start = Instant::now();
        info!(
            correlation_id = %correlation_id,
            name = %definition.name,
            kind = definition.kind().as_str(),
            "Creating schedule"
        );

        let plan = self.assembler.assemble(definition, None, &correlation_id).await?;
        check_fingerprint(options.expected_fingerprint.as_deref(), &plan.fingerprint)?;
        if plan.conflicts.has_blocking() && !options.allow_conflicts {
            warn!(
                correlation_id = %correlation_id,
                conflicts = plan.conflicts.total(),
                "Refusing to create conflicting schedule"
            );
            return Err(ScheduleError::ConflictsDetected(plan.conflicts));
        }

        let status = ScheduleStatus::initial(definition.kind());
        let new = NewSchedule {
            definition,
            status,
            participants: &plan.participants,
            role: plan.role,
            estimated_end_date: plan.estimated_end_date,
            fingerprint: &plan.fingerprint,
        };
        let outcome = self.store.create_schedule(
            &new,
            &plan.final_sessions,
            &plan.candidate(definition, None),
            options.allow_conflicts,
        );

        let (schedule_id, version, conflicts) = match outcome {
            Ok(CommitOutcome::Committed { id, version, conflicts }) => (id, version, conflicts),
            Ok(CommitOutcome::Rejected(conflicts)) => {
                // Someone booked the same resources after the plan was assembled
                warn!(correlation_id = %correlation_id, "Conflicts appeared during commit");
                return Err(ScheduleError::ConflictsDetected(conflicts));
            }
            // Inserts have no prior version to compare against
            Ok(CommitOutcome::Stale) => {
                return Err(ScheduleError::ConflictsDetected(GroupedConflicts::default()));
            }
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Failed to persist schedule");
                return Err(e.into());
            }
        };

        info!(
            correlation_id = %correlation_id,
            schedule_id,
            sessions = plan.final_sessions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Schedule created"
        );

        Ok(CreatedSchedule {
            schedule_id,
            version,
            status,
            final_sessions: plan.final_sessions,
            original_sessions: plan.original_sessions,
            holiday_impacts: plan.holiday_impacts,
            conflicts,
            estimated_end_date: plan.estimated_end_date,
            fingerprint: plan.fingerprint,
        })
    }

    /// Replaces a schedule's sessions with a plan for `definition`.
    ///
    /// The schedule's own sessions are ignored when checking conflicts.
    pub async fn regenerate(
        &self,
        schedule_id: i64,
        definition: &ScheduleDefinition,
        options: &RegenerateOptions,
    ) -> Result<CreatedSchedule, ScheduleError> {
        let correlation_id = generate_correlation_id();
        let lock = self.schedule_lock(schedule_id);
        let _guard = lock.lock().await;

        let existing = self.require_schedule(schedule_id)?;
        if !existing.status.allows_regeneration() {
            return Err(ScheduleError::InvalidTransition {
                from: existing.status.as_str().to_string(),
                to: "regenerated".to_string(),
            });
        }
        if existing.version != options.expected_version {
            return Err(ScheduleError::VersionMismatch {
                schedule_id,
                expected: options.expected_version,
                actual: existing.version,
            });
        }

        info!(
            correlation_id = %correlation_id,
            schedule_id,
            version = existing.version,
            "Regenerating schedule sessions"
        );

        let plan = self
            .assembler
            .assemble(definition, Some(schedule_id), &correlation_id)
            .await?;
        check_fingerprint(options.expected_fingerprint.as_deref(), &plan.fingerprint)?;
        if plan.conflicts.has_blocking() && !options.allow_conflicts {
            return Err(ScheduleError::ConflictsDetected(plan.conflicts));
        }

        let new = NewSchedule {
            definition,
            status: existing.status,
            participants: &plan.participants,
            role: plan.role,
            estimated_end_date: plan.estimated_end_date,
            fingerprint: &plan.fingerprint,
        };
        let outcome = self.store.replace_sessions(
            schedule_id,
            options.expected_version,
            &new,
            &plan.final_sessions,
            &plan.candidate(definition, Some(schedule_id)),
            options.allow_conflicts,
        )?;

        let (version, conflicts) = match outcome {
            CommitOutcome::Committed { version, conflicts, .. } => (version, conflicts),
            CommitOutcome::Rejected(conflicts) => return Err(ScheduleError::ConflictsDetected(conflicts)),
            CommitOutcome::Stale => {
                let actual = self.require_schedule(schedule_id)?.version;
                return Err(ScheduleError::VersionMismatch {
                    schedule_id,
                    expected: options.expected_version,
                    actual,
                });
            }
        };

        Ok(CreatedSchedule {
            schedule_id,
            version,
            status: existing.status,
            final_sessions: plan.final_sessions,
            original_sessions: plan.original_sessions,
            holiday_impacts: plan.holiday_impacts,
            conflicts,
            estimated_end_date: plan.estimated_end_date,
            fingerprint: plan.fingerprint,
        })
    }

    /// Moves a schedule through its lifecycle. Cancelling also cancels
    /// every session that has not happened yet.
    pub fn transition_schedule(&self, schedule_id: i64, to: ScheduleStatus) -> Result<DbSchedule, ScheduleError> {
        let existing = self.require_schedule(schedule_id)?;
        existing.status.transition(to)?;

        if !self.store.update_schedule_status(schedule_id, existing.status, to)? {
            let current = self.require_schedule(schedule_id)?;
            return Err(ScheduleError::schedule_transition(current.status, to));
        }

        if to == ScheduleStatus::Cancelled {
            let cancelled = self.store.cancel_open_sessions(schedule_id, "Schedule cancelled")?;
            info!(schedule_id, cancelled, "Cancelled open sessions");
        }

        info!(
            schedule_id,
            from = existing.status.as_str(),
            to = to.as_str(),
            "Schedule status changed"
        );
        self.require_schedule(schedule_id)
    }

    /// Applies a session status change. Rescheduling creates a make-up
    /// session on the requested date, checked for conflicts first.
    pub fn transition_session(
        &self,
        session_id: i64,
        change: &SessionTransition,
    ) -> Result<SessionTransitionResult, ScheduleError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or(ScheduleError::NotFound {
                entity: "session",
                id: session_id,
            })?;
        session.status.transition(change.status)?;

        if change.status == SessionStatus::Rescheduled {
            return self.reschedule_session(session, change);
        }

        if !self
            .store
            .update_session_status(session_id, session.status, change.status, change.note.as_deref())?
        {
            let current = self.require_session(session_id)?;
            return Err(ScheduleError::session_transition(current.status, change.status));
        }

        info!(
            session_id,
            from = session.status.as_str(),
            to = change.status.as_str(),
            "Session status changed"
        );

        Ok(SessionTransitionResult {
            session: self.require_session(session_id)?,
            makeup: None,
            conflicts: GroupedConflicts::default(),
        })
    }

    fn reschedule_session(
        &self,
        original: DbSession,
        change: &SessionTransition,
    ) -> Result<SessionTransitionResult, ScheduleError> {
        let (date, start_time) = match (change.makeup_date, change.makeup_start_time) {
            (Some(date), Some(start)) => (date, start),
            _ => {
                return Err(ScheduleError::MakeupSlotRequired {
                    session_id: original.session_id,
                })
            }
        };

        let schedule = self.require_schedule(original.schedule_id)?;
        let definition = &schedule.definition;
        let minutes = (original.end_time - original.start_time).num_minutes();
        let end_time = session_end(start_time, minutes)?;

        self.assembler
            .validator_for(definition.branch_id)?
            .validate(date.weekday().num_days_from_monday() as u8, start_time, minutes)?;

        let makeup = GeneratedSession {
            session_number: original.session_number,
            week_number: week_number(definition.start_date, date),
            date,
            start_time,
            end_time,
            status: initial_session_status(schedule.kind),
            is_makeup: true,
            teacher_id: change.teacher_id.or(original.teacher_id),
            room_id: change.room_id.or(original.room_id),
            notes: Some(
                change
                    .note
                    .clone()
                    .unwrap_or_else(|| format!("Make-up for session {}", original.session_number)),
            ),
        };

        let (participants, role) = self.assembler.resolve_participants(&definition.target)?;
        let sessions = [makeup];
        let candidate = ConflictCandidate {
            sessions: &sessions,
            room_id: None,
            teacher_id: None,
            participants: &participants,
            participant_type: participant_type(role),
            exclude_schedule_id: None,
        };

        match self
            .store
            .reschedule_session(&original, &sessions[0], &candidate, change.allow_conflicts)?
        {
            CommitOutcome::Committed { id, conflicts, .. } => Ok(SessionTransitionResult {
                session: self.require_session(original.session_id)?,
                makeup: Some(self.require_session(id)?),
                conflicts,
            }),
            CommitOutcome::Rejected(conflicts) => Err(ScheduleError::ConflictsDetected(conflicts)),
            CommitOutcome::Stale => {
                let current = self.require_session(original.session_id)?;
                Err(ScheduleError::session_transition(current.status, SessionStatus::Rescheduled))
            }
        }
    }

    /// Checks one room booking against operating hours and existing sessions.
    pub fn check_room(&self, request: &RoomCheckRequest) -> Result<RoomCheck, ScheduleError> {
        let weekday = request.date.weekday().num_days_from_monday() as u8;
        let hours = self
            .assembler
            .validator_for(request.branch_id)?
            .validate(weekday, request.start_time, request.duration_minutes);
        let end_time = session_end(request.start_time, request.duration_minutes)?;

        let probe = [GeneratedSession {
            session_number: 1,
            week_number: 1,
            date: request.date,
            start_time: request.start_time,
            end_time,
            status: SessionStatus::Scheduled,
            is_makeup: false,
            teacher_id: None,
            room_id: Some(request.room_id),
            notes: None,
        }];
        let candidate = ConflictCandidate {
            sessions: &probe,
            room_id: Some(request.room_id),
            teacher_id: None,
            participants: &[],
            participant_type: ResourceType::Participant,
            exclude_schedule_id: request.exclude_schedule_id,
        };
        let conflicts = ConflictDetector::new(self.store.as_ref()).detect(&candidate)?;

        let within_operating_hours = hours.is_ok();
        Ok(RoomCheck {
            available: within_operating_hours && conflicts.room.is_empty(),
            within_operating_hours,
            hours_issue: hours.err().map(|e| e.to_string()),
            conflicts: conflicts.room,
        })
    }

    pub fn schedule(&self, schedule_id: i64) -> Result<DbSchedule, ScheduleError> {
        self.require_schedule(schedule_id)
    }

    pub fn sessions(&self, schedule_id: i64, include_superseded: bool) -> Result<Vec<DbSession>, ScheduleError> {
        self.require_schedule(schedule_id)?;
        Ok(self.store.sessions_for_schedule(schedule_id, include_superseded)?)
    }

    fn require_schedule(&self, schedule_id: i64) -> Result<DbSchedule, ScheduleError> {
        self.store.get_schedule(schedule_id)?.ok_or(ScheduleError::NotFound {
            entity: "schedule",
            id: schedule_id,
        })
    }

    fn require_session(&self, session_id: i64) -> Result<DbSession, ScheduleError> {
        self.store.get_session(session_id)?.ok_or(ScheduleError::NotFound {
            entity: "session",
            id: session_id,
        })
    }
}

fn check_fingerprint(expected: Option<&str>, actual: &str) -> Result<(), ScheduleError> {
    match expected {
        Some(expected) if expected != actual => Err(ScheduleError::PreviewMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Generates a short correlation id for tracing one request through the pipeline.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holiday::HolidayCalendar;
    use crate::schedule::planner::tests::{date, definition, time};
    use crate::schedule::preview::tests::{assembler_with, store_with_group};

    fn service_with(calendar: HolidayCalendar) -> ScheduleService {
        ScheduleService::new(assembler_with(store_with_group(), calendar))
    }

    fn hangul_day() -> HolidayCalendar {
        let mut calendar = HolidayCalendar::new();
        calendar.insert(date(2025, 10, 13), "Hangul Day (observed)");
        calendar
    }

    #[tokio::test]
    async fn test_create_persists_previewed_sessions() {
        let service = service_with(hangul_day());
        let def = definition(RecurrencePattern::Weekly, 5.0, 1.0);

        let preview = service.preview(&def).await.unwrap();
        let options = CreateOptions {
            allow_conflicts: false,
            expected_fingerprint: preview.fingerprint.clone(),
        };
        let created = service.create(&def, &options).await.unwrap();

        assert_eq!(created.final_sessions, preview.final_sessions);
        assert_eq!(created.status, ScheduleStatus::Assigned);
        assert_eq!(Some(created.estimated_end_date), preview.estimated_end_date);

        let stored = service.sessions(created.schedule_id, false).unwrap();
        let stored: Vec<(u32, NaiveDate, NaiveTime, NaiveTime)> = stored
            .iter()
            .map(|s| (s.session_number, s.date, s.start_time, s.end_time))
            .collect();
        let previewed: Vec<(u32, NaiveDate, NaiveTime, NaiveTime)> = preview
            .final_sessions
            .iter()
            .map(|s| (s.session_number, s.date, s.start_time, s.end_time))
            .collect();
        assert_eq!(stored, previewed);
    }

    #[tokio::test]
    async fn test_create_rejects_conflicts_unless_allowed() {
        let service = service_with(HolidayCalendar::new());
        let def = definition(RecurrencePattern::Weekly, 2.0, 1.0);
        service.create(&def, &CreateOptions::default()).await.unwrap();

        let err = service.create(&def, &CreateOptions::default()).await.unwrap_err();
        match err {
            ScheduleError::ConflictsDetected(conflicts) => {
                assert_eq!(conflicts.room.len(), 2);
                assert_eq!(conflicts.teacher.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let forced = CreateOptions {
            allow_conflicts: true,
            ..CreateOptions::default()
        };
        let created = service.create(&def, &forced).await.unwrap();
        assert_eq!(created.conflicts.room.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_stale_fingerprint() {
        let service = service_with(HolidayCalendar::new());
        let options = CreateOptions {
            allow_conflicts: false,
            expected_fingerprint: Some("0".repeat(64)),
        };
        let err = service
            .create(&definition(RecurrencePattern::Weekly, 2.0, 1.0), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::PreviewMismatch { .. }));
    }

    #[tokio::test]
    async fn test_regenerate_requires_current_version() {
        let service = service_with(HolidayCalendar::new());
        let def = definition(RecurrencePattern::Weekly, 4.0, 1.0);
        let created = service.create(&def, &CreateOptions::default()).await.unwrap();

        let mut revised = def.clone();
        revised.start_time = Some(time(15, 0));
        let stale = RegenerateOptions {
            expected_version: created.version + 1,
            allow_conflicts: false,
            expected_fingerprint: None,
        };
        let err = service
            .regenerate(created.schedule_id, &revised, &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::VersionMismatch { actual: 1, .. }));

        // Own sessions never conflict with their replacement
        let current = RegenerateOptions {
            expected_version: created.version,
            ..stale
        };
        let regenerated = service
            .regenerate(created.schedule_id, &def, &current)
            .await
            .unwrap();
        assert_eq!(regenerated.version, 2);
        assert!(regenerated.conflicts.is_empty());
        assert_eq!(service.sessions(created.schedule_id, true).unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_schedule_lifecycle_and_cancellation() {
        let service = service_with(HolidayCalendar::new());
        let def = definition(RecurrencePattern::Weekly, 2.0, 1.0);
        let created = service.create(&def, &CreateOptions::default()).await.unwrap();
        let id = created.schedule_id;

        let err = service.transition_schedule(id, ScheduleStatus::Completed).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTransition { .. }));

        let scheduled = service.transition_schedule(id, ScheduleStatus::Scheduled).unwrap();
        assert_eq!(scheduled.status, ScheduleStatus::Scheduled);

        service.transition_schedule(id, ScheduleStatus::Cancelled).unwrap();
        let sessions = service.sessions(id, false).unwrap();
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Cancelled));

        // Cancelled sessions release the room
        service.create(&def, &CreateOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_reschedule_session_creates_makeup() {
        let service = service_with(HolidayCalendar::new());
        let def = definition(RecurrencePattern::Weekly, 2.0, 2.0);
        let created = service.create(&def, &CreateOptions::default()).await.unwrap();
        let original = service.sessions(created.schedule_id, false).unwrap().remove(0);

        let missing = SessionTransition {
            status: SessionStatus::Rescheduled,
            note: None,
            makeup_date: None,
            makeup_start_time: None,
            room_id: None,
            teacher_id: None,
            allow_conflicts: false,
        };
        let err = service.transition_session(original.session_id, &missing).unwrap_err();
        assert!(matches!(err, ScheduleError::MakeupSlotRequired { .. }));

        let change = SessionTransition {
            makeup_date: Some(date(2025, 10, 8)),
            makeup_start_time: Some(time(14, 0)),
            ..missing
        };
        let result = service.transition_session(original.session_id, &change).unwrap();
        assert_eq!(result.session.status, SessionStatus::Rescheduled);

        let makeup = result.makeup.unwrap();
        assert!(makeup.is_makeup);
        assert_eq!(makeup.makeup_for_session_id, Some(original.session_id));
        assert_eq!(makeup.date, date(2025, 10, 8));
        assert_eq!(makeup.end_time, time(16, 0));
        assert_eq!(makeup.room_id, Some(4));

        // A rescheduled session is terminal
        let again = service.transition_session(original.session_id, &change).unwrap_err();
        assert!(matches!(again, ScheduleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_regenerate_as_meeting_changes_makeup_status() {
        let service = service_with(HolidayCalendar::new());
        let class = definition(RecurrencePattern::Weekly, 2.0, 1.0);
        let created = service.create(&class, &CreateOptions::default()).await.unwrap();

        let mut meeting = class.clone();
        meeting.target = ScheduleTarget::Meeting { participants: vec![30] };
        let options = RegenerateOptions {
            expected_version: created.version,
            allow_conflicts: false,
            expected_fingerprint: None,
        };
        service.regenerate(created.schedule_id, &meeting, &options).await.unwrap();
        assert_eq!(service.schedule(created.schedule_id).unwrap().kind, ScheduleKind::Meeting);

        let session = service.sessions(created.schedule_id, false).unwrap().remove(0);
        assert_eq!(session.status, SessionStatus::Scheduled);

        let change = SessionTransition {
            status: SessionStatus::Rescheduled,
            note: None,
            makeup_date: Some(date(2025, 10, 8)),
            makeup_start_time: Some(time(14, 0)),
            room_id: None,
            teacher_id: None,
            allow_conflicts: false,
        };
        let makeup = service.transition_session(session.session_id, &change).unwrap().makeup.unwrap();
        assert_eq!(makeup.status, SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_session_confirm_then_complete() {
        let service = service_with(HolidayCalendar::new());
        let created = service
            .create(&definition(RecurrencePattern::Weekly, 1.0, 1.0), &CreateOptions::default())
            .await
            .unwrap();
        let session = service.sessions(created.schedule_id, false).unwrap().remove(0);

        let to = |status| SessionTransition {
            status,
            note: None,
            makeup_date: None,
            makeup_start_time: None,
            room_id: None,
            teacher_id: None,
            allow_conflicts: false,
        };

        let err = service
            .transition_session(session.session_id, &to(SessionStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTransition { .. }));

        service
            .transition_session(session.session_id, &to(SessionStatus::Confirmed))
            .unwrap();
        let done = service
            .transition_session(session.session_id, &to(SessionStatus::Completed))
            .unwrap();
        assert_eq!(done.session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_room_check_adjacent_slot_is_free() {
        let service = service_with(HolidayCalendar::new());
        // Tuesday 2025-10-14, 09:00-11:00 in room 4
        let mut def = definition(RecurrencePattern::Weekly, 2.0, 2.0);
        def.start_date = date(2025, 10, 14);
        service.create(&def, &CreateOptions::default()).await.unwrap();

        let request = |start| RoomCheckRequest {
            room_id: 4,
            date: date(2025, 10, 14),
            start_time: start,
            duration_minutes: 120,
            branch_id: None,
            exclude_schedule_id: None,
        };

        let busy = service.check_room(&request(time(9, 0))).unwrap();
        assert!(!busy.available);
        assert_eq!(busy.conflicts.len(), 1);

        let free = service.check_room(&request(time(11, 0))).unwrap();
        assert!(free.available);
        assert!(free.conflicts.is_empty());

        let late = service.check_room(&request(time(20, 0))).unwrap();
        assert!(!late.within_operating_hours);
        assert!(late.hours_issue.is_some());
    }
}
