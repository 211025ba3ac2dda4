//! Resource conflict detection against persisted sessions.
//!
//! Candidates are compared with every active booking sharing a room, a
//! teacher or a participant. Two sessions collide when they are on the same
//! date and their `[start, end)` ranges intersect; back-to-back sessions do
//! not collide.

use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeMap;
use tracing::debug;

use super::types::{ConflictRecord, GeneratedSession, GroupedConflicts, ResourceType};
use crate::db::{BookedSession, StoreError};

/// Read access to persisted bookings for one resource.
///
/// Implementations only return sessions that still hold their resource
/// (not cancelled, no-show or rescheduled) and skip `exclude_schedule_id`.
pub trait SessionLookup {
    fn booked_sessions(
        &self,
        resource: ResourceType,
        resource_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        exclude_schedule_id: Option<i64>,
    ) -> Result<Vec<BookedSession>, StoreError>;
}

/// Everything needed to check a candidate sequence.
#[derive(Debug, Clone, Copy)]
pub struct ConflictCandidate<'a> {
    pub sessions: &'a [GeneratedSession],
    /// Default room, overridden per session by `GeneratedSession::room_id`
    pub room_id: Option<i64>,
    /// Default teacher, overridden per session by `GeneratedSession::teacher_id`
    pub teacher_id: Option<i64>,
    pub participants: &'a [i64],
    /// `Participant` for non-class schedules, `Student` for classes
    pub participant_type: ResourceType,
    pub exclude_schedule_id: Option<i64>,
}

/// Same date and intersecting half-open ranges.
pub fn overlaps(
    date_a: NaiveDate,
    start_a: NaiveTime,
    end_a: NaiveTime,
    date_b: NaiveDate,
    start_b: NaiveTime,
    end_b: NaiveTime,
) -> bool {
    date_a == date_b && !(end_b <= start_a || end_a <= start_b)
}

pub struct ConflictDetector<'a, L: SessionLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: SessionLookup + ?Sized> ConflictDetector<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    pub fn detect(&self, candidate: &ConflictCandidate<'_>) -> Result<GroupedConflicts, StoreError> {
        let mut conflicts = GroupedConflicts::default();
        let Some((from, to)) = date_range(candidate.sessions) else {
            return Ok(conflicts);
        };

        let mut by_room: BTreeMap<i64, Vec<&GeneratedSession>> = BTreeMap::new();
        let mut by_teacher: BTreeMap<i64, Vec<&GeneratedSession>> = BTreeMap::new();
        for session in candidate.sessions {
            if let Some(room) = session.room_id.or(candidate.room_id) {
                by_room.entry(room).or_default().push(session);
            }
            if let Some(teacher) = session.teacher_id.or(candidate.teacher_id) {
                by_teacher.entry(teacher).or_default().push(session);
            }
        }

        for (room, sessions) in &by_room {
            self.check_resource(ResourceType::Room, *room, sessions, from, to, candidate, &mut conflicts)?;
        }
        for (teacher, sessions) in &by_teacher {
            self.check_resource(ResourceType::Teacher, *teacher, sessions, from, to, candidate, &mut conflicts)?;
        }

        let everyone: Vec<&GeneratedSession> = candidate.sessions.iter().collect();
        let mut participants = candidate.participants.to_vec();
        participants.sort_unstable();
        participants.dedup();
        for participant in participants {
            self.check_resource(
                candidate.participant_type,
                participant,
                &everyone,
                from,
                to,
                candidate,
                &mut conflicts,
            )?;
        }

        if !conflicts.is_empty() {
            debug!(
                rooms = conflicts.room.len(),
                teachers = conflicts.teacher.len(),
                participants = conflicts.participant.len() + conflicts.student.len(),
                "Detected session conflicts"
            );
        }

        Ok(conflicts)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_resource(
        &self,
        resource: ResourceType,
        resource_id: i64,
        sessions: &[&GeneratedSession],
        from: NaiveDate,
        to: NaiveDate,
        candidate: &ConflictCandidate<'_>,
        conflicts: &mut GroupedConflicts,
    ) -> Result<(), StoreError> {
        let booked = self
            .lookup
            .booked_sessions(resource, resource_id, from, to, candidate.exclude_schedule_id)?;
        if booked.is_empty() {
            return Ok(());
        }

        for session in sessions {
            for existing in &booked {
                if overlaps(
                    session.date,
                    session.start_time,
                    session.end_time,
                    existing.date,
                    existing.start_time,
                    existing.end_time,
                ) {
                    conflicts.push(ConflictRecord {
                        resource_type: resource,
                        resource_id,
                        existing_schedule_id: existing.schedule_id,
                        existing_session_id: existing.session_id,
                        date: existing.date,
                        start_time: existing.start_time,
                        end_time: existing.end_time,
                        session_number: session.session_number,
                    });
                }
            }
        }

        Ok(())
    }
}

fn date_range(sessions: &[GeneratedSession]) -> Option<(NaiveDate, NaiveDate)> {
    let from = sessions.iter().map(|s| s.date).min()?;
    let to = sessions.iter().map(|s| s.date).max()?;
    Some((from, to))
}
