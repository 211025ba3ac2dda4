//! The pipeline shared by preview, create and regenerate.
//!
//! Order matters and is the same for every caller:
//! participants, slot and operating-hour validation, raw generation, raw
//! conflicts, holidays, rescheduling, re-validation, final conflicts, end
//! date, payment and fingerprint. Create persists exactly the
//! `final_sessions` this produces.

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::conflict::{ConflictCandidate, ConflictDetector};
use super::error::ScheduleError;
use super::hours::{BranchHours, BranchHoursValidator};
use super::planner::RecurrencePlanner;
use super::reschedule::RescheduleEngine;
use super::types::*;
use crate::db::{ParticipantRole, SessionStore};
use crate::holiday::{HolidayCalendar, HolidayProvider};

/// Everything the pipeline computed for one definition.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub participants: Vec<i64>,
    pub role: ParticipantRole,
    pub original_sessions: Vec<GeneratedSession>,
    pub final_sessions: Vec<GeneratedSession>,
    pub holiday_impacts: Vec<HolidayImpact>,
    pub conflicts_before_adjustment: GroupedConflicts,
    pub conflicts: GroupedConflicts,
    pub estimated_end_date: NaiveDate,
    pub payment: Option<PaymentSummary>,
    pub fingerprint: String,
    /// Non-blocking findings such as holiday fetch failures
    pub warnings: Vec<Issue>,
}

impl PlanOutcome {
    /// Conflict scope for the final sessions of `definition`.
    pub fn candidate<'a>(
        &'a self,
        definition: &ScheduleDefinition,
        exclude_schedule_id: Option<i64>,
    ) -> ConflictCandidate<'a> {
        ConflictCandidate {
            sessions: &self.final_sessions,
            room_id: definition.room_id,
            teacher_id: definition.teacher_id,
            participants: &self.participants,
            participant_type: participant_type(self.role),
            exclude_schedule_id,
        }
    }

    pub fn into_report(self) -> PreviewReport {
        let mut issues = self.warnings;
        issues.extend(conflict_issues(&self.conflicts));
        let can_create = !issues.iter().any(|i| i.severity == IssueSeverity::Error);

        PreviewReport {
            can_create,
            issues,
            original_sessions: self.original_sessions,
            final_sessions: self.final_sessions,
            holiday_impacts: self.holiday_impacts,
            conflicts: self.conflicts,
            conflicts_before_adjustment: self.conflicts_before_adjustment,
            estimated_end_date: Some(self.estimated_end_date),
            payment: self.payment,
            fingerprint: Some(self.fingerprint),
        }
    }
}

pub struct PreviewAssembler {
    store: Arc<SessionStore>,
    holidays: Arc<dyn HolidayProvider>,
    planner: RecurrencePlanner,
    rescheduler: RescheduleEngine,
    default_hours: BranchHours,
}

impl PreviewAssembler {
    pub fn new(
        store: Arc<SessionStore>,
        holidays: Arc<dyn HolidayProvider>,
        planner: RecurrencePlanner,
        rescheduler: RescheduleEngine,
        default_hours: BranchHours,
    ) -> Self {
        Self {
            store,
            holidays,
            planner,
            rescheduler,
            default_hours,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Runs the pipeline without writing anything.
    ///
    /// Validation failures become an error issue on the report; store
    /// failures are returned as errors.
    pub async fn preview(
        &self,
        definition: &ScheduleDefinition,
        exclude_schedule_id: Option<i64>,
        correlation_id: &str,
    ) -> Result<PreviewReport, ScheduleError> {
        match self.assemble(definition, exclude_schedule_id, correlation_id).await {
            Ok(outcome) => Ok(outcome.into_report()),
            Err(e) if e.is_validation() => {
                debug!(correlation_id = %correlation_id, error = %e, "Preview rejected definition");
                Ok(rejected_report(&e))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn assemble(
        &self,
        definition: &ScheduleDefinition,
        exclude_schedule_id: Option<i64>,
        correlation_id: &str,
    ) -> Result<PlanOutcome, ScheduleError> {
        let (participants, role) = self.resolve_participants(&definition.target)?;
        let minutes = definition.session_minutes();

        RecurrencePlanner::session_count(definition)?;
        let slots = RecurrencePlanner::effective_slots(definition)?;
        let validator = self.validator_for(definition.branch_id)?;
        validator.validate_all(&slots, minutes)?;

        let original_sessions = self.planner.plan(definition)?;
        let mut warnings = Vec::new();

        let raw_candidate = ConflictCandidate {
            sessions: &original_sessions,
            room_id: definition.room_id,
            teacher_id: definition.teacher_id,
            participants: &participants,
            participant_type: participant_type(role),
            exclude_schedule_id,
        };
        let conflicts_before_adjustment = ConflictDetector::new(self.store.as_ref()).detect(&raw_candidate)?;

        let calendar = self
            .load_holidays(definition, &original_sessions, correlation_id, &mut warnings)
            .await;

        let outcome = if definition.auto_reschedule {
            self.rescheduler
                .reschedule(&original_sessions, &calendar, definition.start_date)
        } else {
            self.rescheduler
                .report_only(&original_sessions, &calendar, definition.start_date)
        };

        if !definition.auto_reschedule && !outcome.impacts.is_empty() {
            warnings.push(Issue::warning(
                "HOLIDAYS_NOT_RESCHEDULED",
                format!("{} session(s) fall on holidays and were kept in place", outcome.impacts.len()),
                json!({ "dates": outcome.impacts.iter().map(|i| i.date).collect::<Vec<_>>() }),
            ));
        }
        if outcome.fallback_count > 0 {
            warnings.push(Issue::warning(
                "RESCHEDULE_FALLBACK",
                format!(
                    "{} session(s) could not keep their weekday within {} days",
                    outcome.fallback_count,
                    self.rescheduler.search_window_days()
                ),
                json!({ "count": outcome.fallback_count }),
            ));
        }

        let final_sessions = outcome.sessions;
        for session in &final_sessions {
            let weekday = session.weekday().num_days_from_monday() as u8;
            validator.validate(weekday, session.start_time, minutes)?;
        }

        let final_candidate = ConflictCandidate {
            sessions: &final_sessions,
            ..raw_candidate
        };
        let conflicts = ConflictDetector::new(self.store.as_ref()).detect(&final_candidate)?;

        let estimated_end_date = final_sessions
            .last()
            .map(|s| s.date)
            .unwrap_or(definition.start_date);
        if let Some(requested) = definition.estimated_end_date {
            if requested != estimated_end_date {
                warnings.push(Issue::warning(
                    "END_DATE_ADJUSTED",
                    format!("Estimated end date moves from {} to {}", requested, estimated_end_date),
                    json!({ "requested": requested, "computed": estimated_end_date }),
                ));
            }
        }

        let payment = definition
            .target
            .group_id()
            .map(|group_id| payment_summary(group_id, &participants, &final_sessions, definition.hours_per_session));
        let fingerprint = plan_fingerprint(&final_sessions);

        info!(
            correlation_id = %correlation_id,
            sessions = final_sessions.len(),
            holidays_hit = outcome.impacts.len(),
            conflicts = conflicts.total(),
            end_date = %estimated_end_date,
            "Assembled schedule plan"
        );

        Ok(PlanOutcome {
            participants,
            role,
            original_sessions,
            final_sessions,
            holiday_impacts: outcome.impacts,
            conflicts_before_adjustment,
            conflicts,
            estimated_end_date,
            payment,
            fingerprint,
            warnings,
        })
    }

    /// Group members for classes, the inline list for everything else.
    pub fn resolve_participants(&self, target: &ScheduleTarget) -> Result<(Vec<i64>, ParticipantRole), ScheduleError> {
        let (mut participants, role) = match target {
            ScheduleTarget::Class { group_id } => {
                let members = self.store.group_members(*group_id)?;
                if members.is_empty() {
                    return Err(ScheduleError::MissingGroup { group_id: *group_id });
                }
                (members, ParticipantRole::Student)
            }
            ScheduleTarget::Meeting { participants }
            | ScheduleTarget::Event { participants }
            | ScheduleTarget::Holiday { participants }
            | ScheduleTarget::Appointment { participants } => (participants.clone(), ParticipantRole::Participant),
        };
        participants.sort_unstable();
        participants.dedup();
        Ok((participants, role))
    }

    /// Branch hours from the store, else the configured default.
    pub fn validator_for(&self, branch_id: Option<i64>) -> Result<BranchHoursValidator, ScheduleError> {
        let stored = match branch_id {
            Some(id) => self.store.branch_hours(id)?,
            None => None,
        };
        let hours = stored.filter(BranchHours::is_valid).unwrap_or(self.default_hours);
        Ok(BranchHoursValidator::new(Some(hours)))
    }

    async fn load_holidays(
        &self,
        definition: &ScheduleDefinition,
        sessions: &[GeneratedSession],
        correlation_id: &str,
        warnings: &mut Vec<Issue>,
    ) -> HolidayCalendar {
        let last = sessions.last().map(|s| s.date).unwrap_or(definition.start_date);
        // Postponed sessions can land up to one search window past the end
        let horizon = last + Duration::days(self.rescheduler.search_window_days());
        let (start_year, end_year) = (definition.start_date.year(), horizon.year());

        match self.holidays.fetch_holidays(start_year, end_year).await {
            Ok(calendar) => calendar,
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    start_year,
                    end_year,
                    error = %e,
                    "Holiday lookup failed, planning without holidays"
                );
                warnings.push(Issue::warning(
                    "HOLIDAY_FETCH_FAILED",
                    format!("Holidays unavailable: {}", e),
                    json!({ "start_year": start_year, "end_year": end_year }),
                ));
                HolidayCalendar::new()
            }
        }
    }
}

pub(crate) fn participant_type(role: ParticipantRole) -> ResourceType {
    match role {
        ParticipantRole::Student => ResourceType::Student,
        ParticipantRole::Participant => ResourceType::Participant,
    }
}

fn conflict_issues(conflicts: &GroupedConflicts) -> Vec<Issue> {
    let mut issues = Vec::new();
    if conflicts.has_blocking() {
        issues.push(Issue::error(
            "CONFLICTS_DETECTED",
            format!(
                "{} room, {} teacher and {} participant conflict(s)",
                conflicts.room.len(),
                conflicts.teacher.len(),
                conflicts.participant.len()
            ),
            json!({
                "room": conflicts.room.len(),
                "teacher": conflicts.teacher.len(),
                "participant": conflicts.participant.len(),
            }),
        ));
    }
    if !conflicts.student.is_empty() {
        let mut students: Vec<i64> = conflicts.student.iter().map(|c| c.resource_id).collect();
        students.sort_unstable();
        students.dedup();
        issues.push(Issue::warning(
            "STUDENT_CONFLICTS",
            format!("{} student(s) are booked elsewhere at the same time", students.len()),
            json!({ "students": students }),
        ));
    }
    issues
}

fn rejected_report(error: &ScheduleError) -> PreviewReport {
    let details = match error {
        ScheduleError::OutOfOperatingHours {
            weekday,
            start_time,
            end_time,
            ..
        } => json!({ "weekday": weekday, "start_time": start_time, "end_time": end_time }),
        ScheduleError::SlotCountMismatch { expected, actual } => json!({ "expected": expected, "actual": actual }),
        _ => serde_json::Value::Null,
    };

    PreviewReport {
        can_create: false,
        issues: vec![Issue::error(error.code(), error.to_string(), details)],
        original_sessions: Vec::new(),
        final_sessions: Vec::new(),
        holiday_impacts: Vec::new(),
        conflicts: GroupedConflicts::default(),
        conflicts_before_adjustment: GroupedConflicts::default(),
        estimated_end_date: None,
        payment: None,
        fingerprint: None,
    }
}

fn payment_summary(
    group_id: i64,
    students: &[i64],
    sessions: &[GeneratedSession],
    hours_per_session: f64,
) -> PaymentSummary {
    let billable_sessions = sessions.len() as u32;
    let billable_hours = billable_sessions as f64 * hours_per_session;
    PaymentSummary {
        group_id,
        eligible_students: students.to_vec(),
        billable_sessions,
        billable_hours,
        // Every member attends every session of the class
        hours_per_student: billable_hours,
    }
}

/// SHA-256 over the fields that make a plan, in session order.
pub fn plan_fingerprint(sessions: &[GeneratedSession]) -> String {
    let mut hasher = Sha256::new();
    for s in sessions {
        hasher.update(
            format!(
                "{}|{}|{}|{}|{:?}|{:?}\n",
                s.session_number, s.date, s.start_time, s.end_time, s.room_id, s.teacher_id
            )
            .as_bytes(),
        );
    }
    hex::encode(hasher.finalize())
}
