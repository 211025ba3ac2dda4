//! Holiday rescheduling ("lift and append").
//!
//! Sessions landing on a holiday are lifted out of the sequence and
//! re-appended after the last kept session, each on the next free date with
//! its original weekday. The whole sequence is then re-indexed so session
//! numbers stay dense.
//!
//! This replaced an older strategy that pushed a colliding session to the
//! following day; that variant broke the weekly rhythm and is not kept.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{debug, warn};

use super::types::{week_number, GeneratedSession, HolidayImpact};
use crate::holiday::HolidayCalendar;

pub const DEFAULT_SEARCH_WINDOW_DAYS: i64 = 60;

/// Outer bound for the weekday-agnostic fallback search.
const FALLBACK_LIMIT_DAYS: i64 = 366;

pub const HOLIDAY_NOTE: &str = "Rescheduled due to holiday";

#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleOutcome {
    pub sessions: Vec<GeneratedSession>,
    pub impacts: Vec<HolidayImpact>,
    /// Sessions that could not keep their weekday
    pub fallback_count: usize,
}

#[derive(Debug, Clone)]
pub struct RescheduleEngine {
    search_window_days: i64,
}

impl Default for RescheduleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_WINDOW_DAYS)
    }
}

impl RescheduleEngine {
    pub fn new(search_window_days: i64) -> Self {
        Self {
            search_window_days: search_window_days.max(1),
        }
    }

    pub fn search_window_days(&self) -> i64 {
        self.search_window_days
    }

    /// Moves holiday sessions and re-indexes the result.
    pub fn reschedule(
        &self,
        sessions: &[GeneratedSession],
        holidays: &HolidayCalendar,
        start_date: NaiveDate,
    ) -> RescheduleOutcome {
        let (kept, postponed): (Vec<_>, Vec<_>) = sessions
            .iter()
            .cloned()
            .partition(|s| !holidays.contains(s.date));

        if postponed.is_empty() {
            let mut sessions = kept;
            reindex(&mut sessions, start_date);
            return RescheduleOutcome {
                sessions,
                impacts: Vec::new(),
                fallback_count: 0,
            };
        }

        // Nothing to anchor against: leave everything where it is
        if kept.is_empty() {
            warn!(
                sessions = postponed.len(),
                "Every session falls on a holiday, leaving sequence unchanged"
            );
            return self.report_only(sessions, holidays, start_date);
        }

        let mut anchor = kept.last().map(|s| s.date).unwrap_or(start_date);
        let mut moved = Vec::with_capacity(postponed.len());
        let mut fallback_count = 0;

        for mut session in postponed {
            let original_date = session.date;
            let original_number = session.session_number;
            let holiday_name = holidays.name_on(original_date).unwrap_or_default().to_string();

            let (new_date, kept_weekday) = match self.next_matching_weekday(anchor, original_date.weekday(), holidays) {
                Some(date) => (date, true),
                None => {
                    fallback_count += 1;
                    warn!(
                        session_number = original_number,
                        date = %original_date,
                        window_days = self.search_window_days,
                        "No free matching weekday in search window, falling back to next non-holiday day"
                    );
                    (next_non_holiday(anchor, holidays), false)
                }
            };

            session.date = new_date;
            session.notes = Some(if kept_weekday {
                format!("{} ({} on {})", HOLIDAY_NOTE, holiday_name, original_date)
            } else {
                format!(
                    "{} ({} on {}); weekday changed, no free {} within {} days",
                    HOLIDAY_NOTE,
                    holiday_name,
                    original_date,
                    original_date.weekday(),
                    self.search_window_days
                )
            });

            debug!(
                session_number = original_number,
                from = %original_date,
                to = %new_date,
                "Lifted holiday session"
            );

            anchor = new_date;
            moved.push((original_number, original_date, holiday_name, session));
        }

        let mut combined = kept;
        combined.extend(moved.iter().map(|(_, _, _, s)| s.clone()));
        reindex(&mut combined, start_date);

        // Moved sessions land strictly after every earlier date, so the date
        // identifies them uniquely after re-indexing.
        let impacts = moved
            .into_iter()
            .map(|(number, date, holiday_name, session)| HolidayImpact {
                session_number: number,
                date,
                holiday_name,
                shifted_to: Some(session.date),
                new_session_number: combined
                    .iter()
                    .find(|s| s.date == session.date && s.start_time == session.start_time)
                    .map(|s| s.session_number),
                was_rescheduled: true,
            })
            .collect();

        RescheduleOutcome {
            sessions: combined,
            impacts,
            fallback_count,
        }
    }

    /// Keeps sessions in place and reports the holidays they hit.
    pub fn report_only(
        &self,
        sessions: &[GeneratedSession],
        holidays: &HolidayCalendar,
        start_date: NaiveDate,
    ) -> RescheduleOutcome {
        let mut sessions = sessions.to_vec();
        reindex(&mut sessions, start_date);

        let impacts = sessions
            .iter()
            .filter_map(|s| {
                holidays.name_on(s.date).map(|name| HolidayImpact {
                    session_number: s.session_number,
                    date: s.date,
                    holiday_name: name.to_string(),
                    shifted_to: None,
                    new_session_number: None,
                    was_rescheduled: false,
                })
            })
            .collect();

        RescheduleOutcome {
            sessions,
            impacts,
            fallback_count: 0,
        }
    }

    fn next_matching_weekday(&self, anchor: NaiveDate, weekday: Weekday, holidays: &HolidayCalendar) -> Option<NaiveDate> {
        (1..=self.search_window_days)
            .map(|offset| anchor + Duration::days(offset))
            .find(|date| date.weekday() == weekday && !holidays.contains(*date))
    }
}

fn next_non_holiday(anchor: NaiveDate, holidays: &HolidayCalendar) -> NaiveDate {
    (1..=FALLBACK_LIMIT_DAYS)
        .map(|offset| anchor + Duration::days(offset))
        .find(|date| !holidays.contains(*date))
        .unwrap_or(anchor + Duration::days(1))
}

/// Sorts by `(date, start_time)` and renumbers sessions and weeks.
///
/// Applying this to an already re-indexed sequence changes nothing.
pub fn reindex(sessions: &mut [GeneratedSession], start_date: NaiveDate) {
    sessions.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
    for (idx, session) in sessions.iter_mut().enumerate() {
        session.session_number = idx as u32 + 1;
        session.week_number = week_number(start_date, session.date);
    }
}
