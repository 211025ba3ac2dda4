//! Background loops running next to the HTTP server.
//!
//! Each loop owns its state, ticks on a fixed interval and reports what it
//! did as [`EngineEvent`]s over an mpsc channel. All loops share one `watch`
//! stop signal owned by the returned [`TaskHandle`].

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TaskConfig;
use crate::db::{SessionStore, StoreError};
use crate::holiday::{HolidayError, HolidayProvider};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    NoShowsMarked {
        session_ids: Vec<i64>,
    },
    UpcomingHoliday {
        session_id: i64,
        schedule_id: i64,
        date: NaiveDate,
        holiday_name: String,
    },
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Holiday(#[from] HolidayError),
}

/// Marks unconfirmed sessions that have ended as no-shows.
pub struct NoShowSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
    grace: ChronoDuration,
}

impl NoShowSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration, grace: ChronoDuration) -> Self {
        Self { store, interval, grace }
    }

    pub fn sweep_once(&self, now: NaiveDateTime) -> Result<Option<EngineEvent>, TaskError> {
        let session_ids = self.store.mark_no_shows(now, self.grace)?;
        if session_ids.is_empty() {
            return Ok(None);
        }
        info!(count = session_ids.len(), "Marked sessions as no-show");
        Ok(Some(EngineEvent::NoShowsMarked { session_ids }))
    }

    async fn run(self, mut stop: watch::Receiver<bool>, events: mpsc::Sender<EngineEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Local::now().naive_local()) {
                        Ok(Some(event)) => {
                            if events.send(event).await.is_err() {
                                debug!("Event receiver dropped, stopping no-show sweeper");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "No-show sweep failed"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("No-show sweeper stopped");
    }
}

/// Announces active sessions that fall on a holiday within the lookahead.
///
/// Each session is announced once; entries are forgotten once their date has passed.
pub struct HolidayReminder {
    store: Arc<SessionStore>,
    holidays: Arc<dyn HolidayProvider>,
    interval: Duration,
    lookahead_days: i64,
    /// session id -> session date
    announced: HashMap<i64, NaiveDate>,
}

impl HolidayReminder {
    pub fn new(
        store: Arc<SessionStore>,
        holidays: Arc<dyn HolidayProvider>,
        interval: Duration,
        lookahead_days: i64,
    ) -> Self {
        Self {
            store,
            holidays,
            interval,
            lookahead_days: lookahead_days.max(0),
            announced: HashMap::new(),
        }
    }

    pub async fn scan_once(&mut self, today: NaiveDate) -> Result<Vec<EngineEvent>, TaskError> {
        self.announced.retain(|_, date| *date >= today);

        let until = today + ChronoDuration::days(self.lookahead_days);
        let sessions = self.store.active_sessions_between(today, until)?;
        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let calendar = self.holidays.fetch_holidays(today.year(), until.year()).await?;
        let mut events = Vec::new();
        for session in sessions {
            let Some(name) = calendar.name_on(session.date) else {
                continue;
            };
            if self.announced.insert(session.session_id, session.date).is_some() {
                continue;
            }
            events.push(EngineEvent::UpcomingHoliday {
                session_id: session.session_id,
                schedule_id: session.schedule_id,
                date: session.date,
                holiday_name: name.to_string(),
            });
        }

        if !events.is_empty() {
            info!(count = events.len(), "Sessions scheduled on upcoming holidays");
        }
        Ok(events)
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>, events: mpsc::Sender<EngineEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        'outer: loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.scan_once(Local::now().date_naive()).await {
                        Ok(found) => {
                            for event in found {
                                if events.send(event).await.is_err() {
                                    break 'outer;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "Holiday reminder scan failed"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Holiday reminder stopped");
    }
}

/// Owns the stop signal and join handles of the spawned loops.
pub struct TaskHandle {
    stop: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl TaskHandle {
    /// Signals every loop to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for result in join_all(self.joins).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

/// Spawns both loops; the receiver yields their events.
pub fn spawn_background_tasks(
    sweeper: NoShowSweeper,
    reminder: HolidayReminder,
) -> (TaskHandle, mpsc::Receiver<EngineEvent>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    let joins = vec![
        tokio::spawn(sweeper.run(stop_rx.clone(), event_tx.clone())),
        tokio::spawn(reminder.run(stop_rx, event_tx)),
    ];

    (TaskHandle { stop: stop_tx, joins }, event_rx)
}

/// Builds both loops from config.
pub fn from_config(
    config: &TaskConfig,
    store: Arc<SessionStore>,
    holidays: Arc<dyn HolidayProvider>,
) -> (NoShowSweeper, HolidayReminder) {
    let sweeper = NoShowSweeper::new(
        store.clone(),
        Duration::from_secs(config.no_show_interval_secs.max(1)),
        ChronoDuration::minutes(config.no_show_grace_minutes.max(0)),
    );
    let reminder = HolidayReminder::new(
        store,
        holidays,
        Duration::from_secs(config.reminder_interval_secs.max(1)),
        config.reminder_lookahead_days,
    );
    (sweeper, reminder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CommitOutcome, NewSchedule, ParticipantRole};
    use crate::holiday::{HolidayCalendar, StaticHolidayProvider};
    use crate::schedule::planner::tests::{date, definition, time};
    use crate::schedule::{
        ConflictCandidate, RecurrencePattern, RecurrencePlanner, ResourceType, ScheduleStatus,
    };

    /// Weekly class from Monday 2025-10-06 09:00, two hours, no holiday handling.
    fn seeded_store(sessions: f64) -> Arc<SessionStore> {
        let store = SessionStore::open_in_memory().unwrap();
        let def = definition(RecurrencePattern::Weekly, sessions * 2.0, 2.0);
        let planned = RecurrencePlanner::default().plan(&def).unwrap();
        let new = NewSchedule {
            definition: &def,
            status: ScheduleStatus::Assigned,
            participants: &[],
            role: ParticipantRole::Student,
            estimated_end_date: planned.last().unwrap().date,
            fingerprint: "seed",
        };
        let candidate = ConflictCandidate {
            sessions: &planned,
            room_id: def.room_id,
            teacher_id: def.teacher_id,
            participants: &[],
            participant_type: ResourceType::Student,
            exclude_schedule_id: None,
        };
        let outcome = store.create_schedule(&new, &planned, &candidate, false).unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed { .. }));
        Arc::new(store)
    }

    fn hangul_day() -> Arc<dyn HolidayProvider> {
        let mut calendar = HolidayCalendar::new();
        calendar.insert(date(2025, 10, 13), "Hangul Day (observed)");
        Arc::new(StaticHolidayProvider::new(calendar))
    }

    #[test]
    fn test_sweeper_reports_marked_sessions() {
        let store = seeded_store(2.0);
        let sweeper = NoShowSweeper::new(store, Duration::from_secs(60), ChronoDuration::minutes(30));

        let before_grace = date(2025, 10, 6).and_time(time(11, 15));
        assert_eq!(sweeper.sweep_once(before_grace).unwrap(), None);

        let after_grace = date(2025, 10, 6).and_time(time(11, 31));
        match sweeper.sweep_once(after_grace).unwrap() {
            Some(EngineEvent::NoShowsMarked { session_ids }) => assert_eq!(session_ids.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(sweeper.sweep_once(after_grace).unwrap(), None);
    }

    #[tokio::test]
    async fn test_reminder_announces_each_session_once() {
        let store = seeded_store(3.0);
        let mut reminder = HolidayReminder::new(store, hangul_day(), Duration::from_secs(60), 7);

        let events = reminder.scan_once(date(2025, 10, 8)).await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::UpcomingHoliday { date: d, holiday_name, .. } => {
                assert_eq!(*d, date(2025, 10, 13));
                assert_eq!(holiday_name, "Hangul Day (observed)");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(reminder.scan_once(date(2025, 10, 9)).await.unwrap().is_empty());
        assert_eq!(reminder.announced.len(), 1);

        // Past sessions are forgotten
        reminder.scan_once(date(2025, 10, 14)).await.unwrap();
        assert!(reminder.announced.is_empty());
        // Outside the lookahead window
        let mut fresh = HolidayReminder::new(seeded_store(3.0), hangul_day(), Duration::from_secs(60), 3);
        assert!(fresh.scan_once(date(2025, 10, 8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_tasks_stop_on_shutdown() {
        let store = seeded_store(1.0);
        let sweeper = NoShowSweeper::new(store.clone(), Duration::from_millis(10), ChronoDuration::minutes(0));
        let reminder = HolidayReminder::new(store, hangul_day(), Duration::from_millis(10), 7);

        let (handle, mut events) = spawn_background_tasks(sweeper, reminder);

        // The seeded session ended in 2025, so the first sweep marks it
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, EngineEvent::NoShowsMarked { .. }));

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }
}
