/// Database module for persisted schedules and their sessions

mod types;

pub use types::*;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::schedule::lifecycle::released_statuses_sql;
use crate::schedule::{
    BranchHours, ConflictCandidate, ConflictDetector, GeneratedSession, ResourceType, ScheduleDefinition,
    ScheduleKind, ScheduleStatus, SessionLookup, SessionStatus,
};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_sessions.sql");

const SESSION_COLUMNS: &str = "session_id, schedule_id, session_number, week_number, date, start_time,
    end_time, status, is_makeup, makeup_for_session_id, teacher_id, room_id, notes, superseded";

/// Errors raised by the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database lock poisoned")]
    Poisoned,
}

pub struct SessionStore {
    db: Mutex<Connection>,
}

impl SessionStore {
    /// Opens (or creates) the database file and initializes the schema
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn branch_hours(&self, branch_id: i64) -> Result<Option<BranchHours>, StoreError> {
        let db = self.lock()?;
        let hours = db
            .query_row(
                "SELECT open_minutes, close_minutes FROM branch_hours WHERE branch_id = ?1",
                [branch_id],
                |row| Ok(BranchHours::new(row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(hours)
    }

    pub fn set_branch_hours(&self, branch_id: i64, hours: BranchHours) -> Result<(), StoreError> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO branch_hours (branch_id, open_minutes, close_minutes) VALUES (?1, ?2, ?3)
             ON CONFLICT(branch_id) DO UPDATE SET open_minutes = ?2, close_minutes = ?3",
            params![branch_id, hours.open_minutes, hours.close_minutes],
        )?;
        Ok(())
    }

    pub fn group_members(&self, group_id: i64) -> Result<Vec<i64>, StoreError> {
        let db = self.lock()?;
        let mut stmt = db.prepare("SELECT member_id FROM group_members WHERE group_id = ?1 ORDER BY member_id")?;
        let members = stmt
            .query_map([group_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(members)
    }

    pub fn add_group_members(&self, group_id: i64, members: &[i64]) -> Result<(), StoreError> {
        let db = self.lock()?;
        for member in members {
            db.execute(
                "INSERT OR IGNORE INTO group_members (group_id, member_id) VALUES (?1, ?2)",
                [group_id, *member],
            )?;
        }
        Ok(())
    }

    pub fn get_schedule(&self, schedule_id: i64) -> Result<Option<DbSchedule>, StoreError> {
        let db = self.lock()?;
        let schedule = db
            .query_row(
                "SELECT schedule_id, name, kind, status, definition, estimated_end_date, fingerprint, version
                 FROM schedules WHERE schedule_id = ?1",
                [schedule_id],
                schedule_from_row,
            )
            .optional()?;
        Ok(schedule)
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<DbSession>, StoreError> {
        let db = self.lock()?;
        let session = db
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                [session_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions of a schedule in `(date, start_time)` order.
    pub fn sessions_for_schedule(&self, schedule_id: i64, include_superseded: bool) -> Result<Vec<DbSession>, StoreError> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE schedule_id = ?1 AND (?2 OR superseded = 0)
             ORDER BY date, start_time, session_id"
        ))?;
        let sessions = stmt
            .query_map(params![schedule_id, include_superseded], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Sessions still holding resources between two dates, inclusive.
    pub fn active_sessions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DbSession>, StoreError> {
        let released = released_statuses_sql();
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE date BETWEEN ?1 AND ?2 AND superseded = 0 AND status NOT IN ({released}, 'completed')
             ORDER BY date, start_time, session_id"
        ))?;
        let sessions = stmt
            .query_map(params![from, to], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Writes a schedule and its sessions in one immediate transaction.
    ///
    /// Conflicts are re-checked inside the transaction so no other writer can
    /// book the same resources between the check and the insert.
    pub fn create_schedule(
        &self,
        new: &NewSchedule<'_>,
        sessions: &[GeneratedSession],
        candidate: &ConflictCandidate<'_>,
        allow_conflicts: bool,
    ) -> Result<CommitOutcome, StoreError> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let conflicts = ConflictDetector::new(&ConnLookup::new(&tx)).detect(candidate)?;
        if conflicts.has_blocking() && !allow_conflicts {
            debug!(conflicts = conflicts.total(), "Rolling back schedule insert");
            return Ok(CommitOutcome::Rejected(conflicts));
        }

        let now = Utc::now().to_rfc3339();
        let def = new.definition;
        tx.execute(
            "INSERT INTO schedules (
                name, kind, pattern, status, group_id, teacher_id, room_id, branch_id,
                start_date, estimated_end_date, definition, fingerprint, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?13)",
            params![
                def.name,
                def.kind().as_str(),
                def.pattern.as_str(),
                new.status.as_str(),
                def.target.group_id(),
                def.teacher_id,
                def.room_id,
                def.branch_id,
                def.start_date,
                new.estimated_end_date,
                serde_json::to_string(def)?,
                new.fingerprint,
                now,
            ],
        )?;
        let schedule_id = tx.last_insert_rowid();

        insert_participants(&tx, schedule_id, new)?;
        insert_sessions(&tx, schedule_id, def, sessions, &now)?;
        tx.commit()?;

        info!(schedule_id, sessions = sessions.len(), "Persisted schedule");

        Ok(CommitOutcome::Committed {
            id: schedule_id,
            version: 1,
            conflicts,
        })
    }

    /// Supersedes a schedule's sessions with a freshly generated set.
    ///
    /// Fails with [`CommitOutcome::Stale`] if `expected_version` is not the
    /// stored version. Completed sessions keep their status but are marked
    /// superseded; active ones are cancelled.
    pub fn replace_sessions(
        &self,
        schedule_id: i64,
        expected_version: i64,
        new: &NewSchedule<'_>,
        sessions: &[GeneratedSession],
        candidate: &ConflictCandidate<'_>,
        allow_conflicts: bool,
    ) -> Result<CommitOutcome, StoreError> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let version: i64 = tx
            .query_row(
                "SELECT version FROM schedules WHERE schedule_id = ?1",
                [schedule_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "schedule",
                id: schedule_id,
            })?;
        if version != expected_version {
            return Ok(CommitOutcome::Stale);
        }

        let conflicts = ConflictDetector::new(&ConnLookup::new(&tx)).detect(candidate)?;
        if conflicts.has_blocking() && !allow_conflicts {
            return Ok(CommitOutcome::Rejected(conflicts));
        }

        let now = Utc::now().to_rfc3339();
        let superseded = tx.execute(
            "UPDATE sessions
             SET status = CASE WHEN status IN ('assigned', 'scheduled', 'confirmed') THEN 'cancelled' ELSE status END,
                 notes = CASE WHEN notes IS NULL THEN 'Superseded by regeneration'
                              ELSE notes || '; Superseded by regeneration' END,
                 superseded = 1,
                 updated_at = ?2
             WHERE schedule_id = ?1 AND superseded = 0",
            params![schedule_id, now],
        )?;

        let def = new.definition;
        tx.execute(
            "UPDATE schedules
             SET name = ?2, kind = ?12, pattern = ?3, group_id = ?13, teacher_id = ?4, room_id = ?5,
                 branch_id = ?6, start_date = ?7, estimated_end_date = ?8, definition = ?9, fingerprint = ?10,
                 version = version + 1, updated_at = ?11
             WHERE schedule_id = ?1",
            params![
                schedule_id,
                def.name,
                def.pattern.as_str(),
                def.teacher_id,
                def.room_id,
                def.branch_id,
                def.start_date,
                new.estimated_end_date,
                serde_json::to_string(def)?,
                new.fingerprint,
                now,
                def.kind().as_str(),
                def.target.group_id(),
            ],
        )?;

        tx.execute("DELETE FROM schedule_participants WHERE schedule_id = ?1", [schedule_id])?;
        insert_participants(&tx, schedule_id, new)?;
        insert_sessions(&tx, schedule_id, def, sessions, &now)?;
        tx.commit()?;

        info!(
            schedule_id,
            superseded,
            sessions = sessions.len(),
            version = version + 1,
            "Regenerated schedule sessions"
        );

        Ok(CommitOutcome::Committed {
            id: schedule_id,
            version: version + 1,
            conflicts,
        })
    }

    /// Compare-and-set on schedule status; bumps the version.
    pub fn update_schedule_status(
        &self,
        schedule_id: i64,
        from: ScheduleStatus,
        to: ScheduleStatus,
    ) -> Result<bool, StoreError> {
        let db = self.lock()?;
        let updated = db.execute(
            "UPDATE schedules SET status = ?3, version = version + 1, updated_at = ?4
             WHERE schedule_id = ?1 AND status = ?2",
            params![schedule_id, from.as_str(), to.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(updated == 1)
    }

    /// Compare-and-set on session status.
    pub fn update_session_status(
        &self,
        session_id: i64,
        from: SessionStatus,
        to: SessionStatus,
        note: Option<&str>,
    ) -> Result<bool, StoreError> {
        let db = self.lock()?;
        let updated = db.execute(
            "UPDATE sessions SET status = ?3, notes = COALESCE(?4, notes), updated_at = ?5
             WHERE session_id = ?1 AND status = ?2",
            params![session_id, from.as_str(), to.as_str(), note, Utc::now().to_rfc3339()],
        )?;
        Ok(updated == 1)
    }

    /// Cancels every session of a schedule that has not happened yet.
    pub fn cancel_open_sessions(&self, schedule_id: i64, note: &str) -> Result<usize, StoreError> {
        let db = self.lock()?;
        let cancelled = db.execute(
            "UPDATE sessions
             SET status = 'cancelled',
                 notes = CASE WHEN notes IS NULL THEN ?2 ELSE notes || '; ' || ?2 END,
                 updated_at = ?3
             WHERE schedule_id = ?1 AND superseded = 0 AND status IN ('assigned', 'scheduled', 'confirmed')",
            params![schedule_id, note, Utc::now().to_rfc3339()],
        )?;
        Ok(cancelled)
    }

    /// Marks `original` rescheduled and inserts its make-up session.
    ///
    /// The original is released before the conflict check so a make-up may
    /// reuse its own resources.
    pub fn reschedule_session(
        &self,
        original: &DbSession,
        makeup: &GeneratedSession,
        candidate: &ConflictCandidate<'_>,
        allow_conflicts: bool,
    ) -> Result<CommitOutcome, StoreError> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let updated = tx.execute(
            "UPDATE sessions SET status = 'rescheduled', updated_at = ?3 WHERE session_id = ?1 AND status = ?2",
            params![original.session_id, original.status.as_str(), now],
        )?;
        if updated != 1 {
            return Ok(CommitOutcome::Stale);
        }

        let conflicts = ConflictDetector::new(&ConnLookup::new(&tx)).detect(candidate)?;
        if conflicts.has_blocking() && !allow_conflicts {
            return Ok(CommitOutcome::Rejected(conflicts));
        }

        tx.execute(
            "INSERT INTO sessions (
                schedule_id, session_number, week_number, date, start_time, end_time, status,
                is_makeup, makeup_for_session_id, teacher_id, room_id, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                original.schedule_id,
                makeup.session_number,
                makeup.week_number,
                makeup.date,
                makeup.start_time,
                makeup.end_time,
                makeup.status.as_str(),
                original.session_id,
                makeup.teacher_id,
                makeup.room_id,
                makeup.notes,
                now,
            ],
        )?;
        let makeup_id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            original_session_id = original.session_id,
            makeup_session_id = makeup_id,
            date = %makeup.date,
            "Created make-up session"
        );

        Ok(CommitOutcome::Committed {
            id: makeup_id,
            version: 0,
            conflicts,
        })
    }

    /// Marks unconfirmed sessions that ended more than `grace` before `now` as
    /// no-shows. Returns the affected session ids.
    pub fn mark_no_shows(&self, now: NaiveDateTime, grace: Duration) -> Result<Vec<i64>, StoreError> {
        let mut db = self.lock()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let cutoff = now - grace;

        let candidates: Vec<DbSession> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE date <= ?1 AND superseded = 0 AND status IN ('assigned', 'scheduled')"
            ))?;
            let rows = stmt
                .query_map([cutoff.date()], session_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let stamp = Utc::now().to_rfc3339();
        let mut marked = Vec::new();
        for session in candidates {
            if session.date.and_time(session.end_time) > cutoff {
                continue;
            }
            let updated = tx.execute(
                "UPDATE sessions SET status = 'no-show', updated_at = ?3 WHERE session_id = ?1 AND status = ?2",
                params![session.session_id, session.status.as_str(), stamp],
            )?;
            if updated == 1 {
                marked.push(session.session_id);
            }
        }
        tx.commit()?;

        Ok(marked)
    }
}

impl SessionLookup for SessionStore {
    fn booked_sessions(
        &self,
        resource: ResourceType,
        resource_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        exclude_schedule_id: Option<i64>,
    ) -> Result<Vec<BookedSession>, StoreError> {
        let db = self.lock()?;
        query_booked(&db, resource, resource_id, from, to, exclude_schedule_id)
    }
}

/// Lookup bound to an open connection or transaction.
pub struct ConnLookup<'a> {
    conn: &'a Connection,
}

impl<'a> ConnLookup<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SessionLookup for ConnLookup<'_> {
    fn booked_sessions(
        &self,
        resource: ResourceType,
        resource_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        exclude_schedule_id: Option<i64>,
    ) -> Result<Vec<BookedSession>, StoreError> {
        query_booked(self.conn, resource, resource_id, from, to, exclude_schedule_id)
    }
}

fn query_booked(
    conn: &Connection,
    resource: ResourceType,
    resource_id: i64,
    from: NaiveDate,
    to: NaiveDate,
    exclude_schedule_id: Option<i64>,
) -> Result<Vec<BookedSession>, StoreError> {
    let filter = match resource {
        ResourceType::Room => "s.room_id = ?1",
        ResourceType::Teacher => "s.teacher_id = ?1",
        ResourceType::Participant | ResourceType::Student => {
            "s.schedule_id IN (SELECT schedule_id FROM schedule_participants WHERE participant_id = ?1)"
        }
    };

    let released = released_statuses_sql();
    let mut stmt = conn.prepare(&format!(
        "SELECT s.session_id, s.schedule_id, s.date, s.start_time, s.end_time, s.status
         FROM sessions s
         WHERE {filter}
           AND s.date BETWEEN ?2 AND ?3
           AND s.superseded = 0
           AND s.status NOT IN ({released})
           AND (?4 IS NULL OR s.schedule_id <> ?4)
         ORDER BY s.date, s.start_time"
    ))?;

    let booked = stmt
        .query_map(params![resource_id, from, to, exclude_schedule_id], |row| {
            Ok(BookedSession {
                session_id: row.get(0)?,
                schedule_id: row.get(1)?,
                date: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                status: parse_session_status(row, 5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(booked)
}

fn insert_participants(conn: &Connection, schedule_id: i64, new: &NewSchedule<'_>) -> Result<(), StoreError> {
    for participant in new.participants {
        conn.execute(
            "INSERT OR IGNORE INTO schedule_participants (schedule_id, participant_id, role) VALUES (?1, ?2, ?3)",
            params![schedule_id, participant, new.role.as_str()],
        )?;
    }
    Ok(())
}

/// Sessions are stored with their effective teacher and room.
fn insert_sessions(
    conn: &Connection,
    schedule_id: i64,
    definition: &ScheduleDefinition,
    sessions: &[GeneratedSession],
    now: &str,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "INSERT INTO sessions (
            schedule_id, session_number, week_number, date, start_time, end_time, status,
            is_makeup, teacher_id, room_id, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
    )?;

    for session in sessions {
        stmt.execute(params![
            schedule_id,
            session.session_number,
            session.week_number,
            session.date,
            session.start_time,
            session.end_time,
            session.status.as_str(),
            session.is_makeup,
            session.teacher_id.or(definition.teacher_id),
            session.room_id.or(definition.room_id),
            session.notes,
            now,
        ])?;
    }

    Ok(())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_session_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<SessionStatus> {
    let raw: String = row.get(idx)?;
    SessionStatus::parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown session status '{raw}'")))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<DbSession> {
    Ok(DbSession {
        session_id: row.get(0)?,
        schedule_id: row.get(1)?,
        session_number: row.get(2)?,
        week_number: row.get(3)?,
        date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        status: parse_session_status(row, 7)?,
        is_makeup: row.get(8)?,
        makeup_for_session_id: row.get(9)?,
        teacher_id: row.get(10)?,
        room_id: row.get(11)?,
        notes: row.get(12)?,
        superseded: row.get(13)?,
    })
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<DbSchedule> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let definition: String = row.get(4)?;

    Ok(DbSchedule {
        schedule_id: row.get(0)?,
        name: row.get(1)?,
        kind: ScheduleKind::parse(&kind).ok_or_else(|| conversion_error(2, format!("unknown kind '{kind}'")))?,
        status: ScheduleStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown schedule status '{status}'")))?,
        definition: serde_json::from_str(&definition).map_err(|e| conversion_error(4, e.to_string()))?,
        estimated_end_date: row.get(5)?,
        fingerprint: row.get(6)?,
        version: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::planner::tests::{date, definition, time};
    use crate::schedule::{RecurrencePattern, RecurrencePlanner, ScheduleTarget};

    fn candidate<'a>(sessions: &'a [GeneratedSession], def: &ScheduleDefinition, participants: &'a [i64]) -> ConflictCandidate<'a> {
        ConflictCandidate {
            sessions,
            room_id: def.room_id,
            teacher_id: def.teacher_id,
            participants,
            participant_type: ResourceType::Student,
            exclude_schedule_id: None,
        }
    }

    fn new_schedule<'a>(def: &'a ScheduleDefinition, participants: &'a [i64], end: NaiveDate) -> NewSchedule<'a> {
        NewSchedule {
            definition: def,
            status: ScheduleStatus::Assigned,
            participants,
            role: ParticipantRole::Student,
            estimated_end_date: end,
            fingerprint: "abc",
        }
    }

    fn persist(store: &SessionStore, def: &ScheduleDefinition) -> (i64, Vec<GeneratedSession>) {
        let sessions = RecurrencePlanner::default().plan(def).unwrap();
        let end = sessions.last().unwrap().date;
        let outcome = store
            .create_schedule(
                &new_schedule(def, &[21, 22], end),
                &sessions,
                &candidate(&sessions, def, &[21, 22]),
                false,
            )
            .unwrap();
        match outcome {
            CommitOutcome::Committed { id, .. } => (id, sessions),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_create_and_read_back() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        let (id, sessions) = persist(&store, &def);

        let schedule = store.get_schedule(id).unwrap().unwrap();
        assert_eq!(schedule.kind, ScheduleKind::Class);
        assert_eq!(schedule.status, ScheduleStatus::Assigned);
        assert_eq!(schedule.definition, def);
        assert_eq!(schedule.version, 1);

        let stored = store.sessions_for_schedule(id, false).unwrap();
        assert_eq!(stored.len(), sessions.len());
        assert_eq!(stored[0].room_id, Some(4));
        assert_eq!(stored[0].teacher_id, Some(7));
        assert_eq!(stored[1].date, sessions[1].date);
        assert_eq!(stored[1].start_time, time(9, 0));
    }

    #[test]
    fn test_second_booking_of_same_room_is_rejected() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        persist(&store, &def);

        let mut other = def.clone();
        other.teacher_id = Some(8);
        let sessions = RecurrencePlanner::default().plan(&other).unwrap();
        let outcome = store
            .create_schedule(
                &new_schedule(&other, &[], sessions[1].date),
                &sessions,
                &candidate(&sessions, &other, &[]),
                false,
            )
            .unwrap();

        match outcome {
            CommitOutcome::Rejected(conflicts) => assert_eq!(conflicts.room.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Nothing from the rejected attempt was written
        assert!(store.get_schedule(2).unwrap().is_none());
    }

    #[test]
    fn test_booked_sessions_filter_status_and_participants() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        let (id, _) = persist(&store, &def);
        let stored = store.sessions_for_schedule(id, false).unwrap();

        store
            .update_session_status(stored[0].session_id, SessionStatus::Assigned, SessionStatus::Cancelled, None)
            .unwrap();

        let range = (date(2025, 10, 1), date(2025, 10, 31));
        let rooms = store.booked_sessions(ResourceType::Room, 4, range.0, range.1, None).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].session_id, stored[1].session_id);

        let students = store.booked_sessions(ResourceType::Student, 22, range.0, range.1, None).unwrap();
        assert_eq!(students.len(), 1);

        let excluded = store.booked_sessions(ResourceType::Room, 4, range.0, range.1, Some(id)).unwrap();
        assert!(excluded.is_empty());
    }

    #[test]
    fn test_replace_sessions_checks_version_and_supersedes() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        let (id, _) = persist(&store, &def);

        let mut revised = def.clone();
        revised.start_time = Some(time(14, 0));
        let sessions = RecurrencePlanner::default().plan(&revised).unwrap();
        let mut scope = candidate(&sessions, &revised, &[21, 22]);
        scope.exclude_schedule_id = Some(id);
        let new = new_schedule(&revised, &[21, 22], sessions[1].date);

        let stale = store.replace_sessions(id, 7, &new, &sessions, &scope, false).unwrap();
        assert_eq!(stale, CommitOutcome::Stale);

        let outcome = store.replace_sessions(id, 1, &new, &sessions, &scope, false).unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed { version: 2, .. }));

        let current = store.sessions_for_schedule(id, false).unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|s| s.start_time == time(14, 0)));

        let all = store.sessions_for_schedule(id, true).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.iter().filter(|s| s.superseded && s.status == SessionStatus::Cancelled).count(), 2);
    }

    #[test]
    fn test_replace_sessions_rewrites_kind_and_group() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        let (id, _) = persist(&store, &def);

        let mut meeting = def.clone();
        meeting.target = ScheduleTarget::Meeting { participants: vec![30] };
        let sessions = RecurrencePlanner::default().plan(&meeting).unwrap();
        let mut scope = candidate(&sessions, &meeting, &[30]);
        scope.exclude_schedule_id = Some(id);
        let new = NewSchedule {
            role: ParticipantRole::Participant,
            ..new_schedule(&meeting, &[30], sessions[1].date)
        };
        store.replace_sessions(id, 1, &new, &sessions, &scope, false).unwrap();

        assert_eq!(store.get_schedule(id).unwrap().unwrap().kind, ScheduleKind::Meeting);
        let group_id: Option<i64> = store
            .lock()
            .unwrap()
            .query_row("SELECT group_id FROM schedules WHERE schedule_id = ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(group_id, None);
    }

    #[test]
    fn test_mark_no_shows_respects_grace() {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        let (id, _) = persist(&store, &def);

        // First session ends 2025-10-06 11:00
        let now = date(2025, 10, 6).and_time(time(11, 30));
        assert!(store.mark_no_shows(now, Duration::hours(1)).unwrap().is_empty());

        let now = date(2025, 10, 6).and_time(time(12, 30));
        let marked = store.mark_no_shows(now, Duration::hours(1)).unwrap();
        assert_eq!(marked.len(), 1);

        let stored = store.sessions_for_schedule(id, false).unwrap();
        assert_eq!(stored[0].status, SessionStatus::NoShow);
        assert_eq!(stored[1].status, SessionStatus::Assigned);
    }

    #[test]
    fn test_branch_hours_and_group_members() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.branch_hours(1).unwrap().is_none());
        store.set_branch_hours(1, BranchHours::new(600, 1200)).unwrap();
        store.set_branch_hours(1, BranchHours::new(540, 1200)).unwrap();
        assert_eq!(store.branch_hours(1).unwrap(), Some(BranchHours::new(540, 1200)));

        store.add_group_members(3, &[12, 11, 12]).unwrap();
        assert_eq!(store.group_members(3).unwrap(), vec![11, 12]);
    }
}
