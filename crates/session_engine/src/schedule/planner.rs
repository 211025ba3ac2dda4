//! Expands a schedule definition into its raw, chronologically ordered sessions.
//!
//! Two modes are supported:
//! - explicit weekly slots, one session per slot on each matching weekday
//! - legacy single-slot patterns (daily, weekly, bi-weekly, monthly, none)
//!   that reuse the definition's daily start time
//!
//! Holidays are not considered here; see [`super::reschedule`].

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::error::ScheduleError;
use super::types::*;

/// Two years of calendar days.
pub const DEFAULT_MAX_GENERATION_DAYS: i64 = 730;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone)]
pub struct RecurrencePlanner {
    max_days: i64,
}

impl Default for RecurrencePlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GENERATION_DAYS)
    }
}

impl RecurrencePlanner {
    pub fn new(max_days: i64) -> Self {
        Self { max_days }
    }

    pub fn max_days(&self) -> i64 {
        self.max_days
    }

    /// `floor(total_hours / hours_per_session)`. Leftover hours are dropped.
    pub fn session_count(definition: &ScheduleDefinition) -> Result<u32, ScheduleError> {
        let invalid = || ScheduleError::InvalidDuration {
            total_hours: definition.total_hours,
            hours_per_session: definition.hours_per_session,
        };

        if !definition.total_hours.is_finite()
            || !definition.hours_per_session.is_finite()
            || definition.hours_per_session <= 0.0
            || definition.session_minutes() <= 0
        {
            return Err(invalid());
        }

        // Guard against 4.5 / 1.5 landing on 2.9999999
        let count = (definition.total_hours / definition.hours_per_session + 1e-9).floor();
        if count < 1.0 {
            return Err(invalid());
        }

        Ok(count as u32)
    }

    /// Checks slot shape before anything is generated.
    pub fn validate_slots(definition: &ScheduleDefinition) -> Result<(), ScheduleError> {
        if definition.slots.is_empty() {
            return match definition.start_time {
                Some(_) => Ok(()),
                None => Err(ScheduleError::MissingStartTime),
            };
        }

        if definition.slots.len() != definition.sessions_per_week as usize {
            return Err(ScheduleError::SlotCountMismatch {
                expected: definition.sessions_per_week,
                actual: definition.slots.len(),
            });
        }

        let mut seen = HashSet::new();
        for slot in &definition.slots {
            if slot.weekday > 6 {
                return Err(ScheduleError::InvalidSlot {
                    message: format!("weekday {} is not in 0..=6", slot.weekday),
                });
            }
            if slot.start_time().is_none() {
                return Err(ScheduleError::InvalidSlot {
                    message: format!(
                        "{:02}:{:02} is not a valid start time",
                        slot.start_hour, slot.start_minute
                    ),
                });
            }
            if !seen.insert(slot.weekday) {
                return Err(ScheduleError::DuplicateSlotWeekday {
                    weekday: slot.weekday,
                });
            }
        }

        Ok(())
    }

    /// The weekday/time pairs this definition will ever produce.
    ///
    /// Used to validate operating hours before generation.
    pub fn effective_slots(definition: &ScheduleDefinition) -> Result<Vec<SessionSlot>, ScheduleError> {
        Self::validate_slots(definition)?;

        if !definition.slots.is_empty() {
            return Ok(definition.slots.clone());
        }

        let start = definition.start_time.ok_or(ScheduleError::MissingStartTime)?;
        let slots = match definition.pattern {
            RecurrencePattern::Daily => WEEKDAYS
                .iter()
                .map(|wd| SessionSlot::from_parts(*wd, start))
                .collect(),
            // Day-of-month patterns can land on any weekday
            RecurrencePattern::Monthly => WEEKDAYS
                .iter()
                .map(|wd| SessionSlot::from_parts(*wd, start))
                .collect(),
            RecurrencePattern::Weekly
            | RecurrencePattern::BiWeekly
            | RecurrencePattern::Custom
            | RecurrencePattern::Once => {
                vec![SessionSlot::from_parts(definition.start_date.weekday(), start)]
            }
        };

        Ok(slots)
    }

    /// Generates the raw session sequence.
    pub fn plan(&self, definition: &ScheduleDefinition) -> Result<Vec<GeneratedSession>, ScheduleError> {
        let required = Self::session_count(definition)?;
        Self::validate_slots(definition)?;

        let sessions = if definition.slots.is_empty() {
            self.plan_legacy(definition, required)?
        } else {
            self.plan_slots(definition, required)?
        };

        debug!(
            pattern = definition.pattern.as_str(),
            sessions = sessions.len(),
            "Planned raw session sequence"
        );

        Ok(sessions)
    }

    fn plan_slots(
        &self,
        definition: &ScheduleDefinition,
        required: u32,
    ) -> Result<Vec<GeneratedSession>, ScheduleError> {
        // weekday -> start times, sorted
        let mut by_weekday: BTreeMap<u32, Vec<NaiveTime>> = BTreeMap::new();
        for slot in &definition.slots {
            if let Some(start) = slot.start_time() {
                by_weekday.entry(slot.weekday as u32).or_default().push(start);
            }
        }
        for times in by_weekday.values_mut() {
            times.sort();
        }

        self.check_reachable(required)?;

        let mut sessions = Vec::new();
        for offset in 0..self.max_days {
            let date = definition.start_date + Duration::days(offset);
            let weekday = date.weekday().num_days_from_monday();

            if let Some(times) = by_weekday.get(&weekday) {
                for start in times {
                    sessions.push(self.make_session(definition, sessions.len() as u32 + 1, date, *start)?);
                    if sessions.len() as u32 == required {
                        return Ok(sessions);
                    }
                }
            }
        }

        Err(ScheduleError::UnboundedGeneration {
            generated: sessions.len() as u32,
            required,
            max_days: self.max_days,
        })
    }

    fn plan_legacy(
        &self,
        definition: &ScheduleDefinition,
        required: u32,
    ) -> Result<Vec<GeneratedSession>, ScheduleError> {
        let start_time = definition.start_time.ok_or(ScheduleError::MissingStartTime)?;
        let start_date = definition.start_date;

        // A one-off schedule is a single session regardless of hours
        if definition.pattern == RecurrencePattern::Once {
            return Ok(vec![self.make_session(definition, 1, start_date, start_time)?]);
        }

        self.check_reachable(required)?;

        let mut sessions = Vec::new();
        for offset in 0..self.max_days {
            let date = start_date + Duration::days(offset);
            if !Self::pattern_matches(definition.pattern, start_date, date, offset) {
                continue;
            }

            sessions.push(self.make_session(definition, sessions.len() as u32 + 1, date, start_time)?);
            if sessions.len() as u32 == required {
                return Ok(sessions);
            }
        }

        Err(ScheduleError::UnboundedGeneration {
            generated: sessions.len() as u32,
            required,
            max_days: self.max_days,
        })
    }

    /// At most one session fits on a calendar day, so more than `max_days`
    /// sessions can never be generated.
    fn check_reachable(&self, required: u32) -> Result<(), ScheduleError> {
        if i64::from(required) > self.max_days {
            return Err(ScheduleError::UnboundedGeneration {
                generated: 0,
                required,
                max_days: self.max_days,
            });
        }
        Ok(())
    }

    fn pattern_matches(pattern: RecurrencePattern, start: NaiveDate, date: NaiveDate, offset: i64) -> bool {
        match pattern {
            RecurrencePattern::Daily => true,
            RecurrencePattern::Weekly | RecurrencePattern::Custom => offset % 7 == 0,
            RecurrencePattern::BiWeekly => offset % 14 == 0,
            // Months without this day (e.g. the 31st) are skipped
            RecurrencePattern::Monthly => date.day() == start.day(),
            RecurrencePattern::Once => offset == 0,
        }
    }

    fn make_session(
        &self,
        definition: &ScheduleDefinition,
        session_number: u32,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<GeneratedSession, ScheduleError> {
        let end_time = session_end(start_time, definition.session_minutes())?;

        Ok(GeneratedSession {
            session_number,
            week_number: week_number(definition.start_date, date),
            date,
            start_time,
            end_time,
            status: initial_session_status(definition.kind()),
            is_makeup: false,
            teacher_id: None,
            room_id: None,
            notes: None,
        })
    }
}

/// End of a session starting at `start`; sessions may not cross midnight.
pub fn session_end(start: NaiveTime, minutes: i64) -> Result<NaiveTime, ScheduleError> {
    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(minutes));
    if wrapped != 0 || end <= start {
        return Err(ScheduleError::InvalidSlot {
            message: format!("a {} minute session starting at {} crosses midnight", minutes, start),
        });
    }
    Ok(end)
}

/// Class sessions wait for the teacher to confirm; everything else is booked outright.
pub fn initial_session_status(kind: ScheduleKind) -> SessionStatus {
    match kind {
        ScheduleKind::Class => SessionStatus::Assigned,
        ScheduleKind::Meeting
        | ScheduleKind::Event
        | ScheduleKind::Holiday
        | ScheduleKind::Appointment => SessionStatus::Scheduled,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    pub(crate) fn definition(pattern: RecurrencePattern, total_hours: f64, hours_per_session: f64) -> ScheduleDefinition {
        ScheduleDefinition {
            name: "Conversation A1".to_string(),
            target: ScheduleTarget::Class { group_id: 1 },
            pattern,
            total_hours,
            hours_per_session,
            sessions_per_week: 1,
            // Monday
            start_date: date(2025, 10, 6),
            estimated_end_date: None,
            start_time: Some(time(9, 0)),
            slots: Vec::new(),
            teacher_id: Some(7),
            room_id: Some(4),
            branch_id: None,
            auto_reschedule: true,
        }
    }

    fn assert_dense(sessions: &[GeneratedSession]) {
        for (idx, s) in sessions.iter().enumerate() {
            assert_eq!(s.session_number, idx as u32 + 1);
        }
    }

    #[test]
    fn test_session_count_for_every_recurring_pattern() {
        let planner = RecurrencePlanner::default();
        for pattern in [
            RecurrencePattern::Daily,
            RecurrencePattern::Weekly,
            RecurrencePattern::BiWeekly,
            RecurrencePattern::Monthly,
            RecurrencePattern::Custom,
        ] {
            let sessions = planner.plan(&definition(pattern, 24.0, 2.0)).unwrap();
            assert_eq!(sessions.len(), 12, "pattern {:?}", pattern);
            assert_dense(&sessions);
        }
    }

    #[test]
    fn test_remainder_hours_are_dropped() {
        let def = definition(RecurrencePattern::Weekly, 25.0, 2.0);
        assert_eq!(RecurrencePlanner::session_count(&def).unwrap(), 12);

        let def = definition(RecurrencePattern::Weekly, 4.5, 1.5);
        assert_eq!(RecurrencePlanner::session_count(&def).unwrap(), 3);
    }

    #[test]
    fn test_invalid_duration() {
        let planner = RecurrencePlanner::default();
        let err = planner.plan(&definition(RecurrencePattern::Weekly, 1.0, 2.0)).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDuration { .. }));

        let err = planner.plan(&definition(RecurrencePattern::Weekly, 10.0, 0.0)).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDuration { .. }));
    }

    #[test]
    fn test_slot_count_mismatch_fails_before_generation() {
        let mut def = definition(RecurrencePattern::Custom, 24.0, 2.0);
        def.sessions_per_week = 3;
        def.slots = vec![SessionSlot::new(0, 9, 0), SessionSlot::new(2, 9, 0)];

        let err = RecurrencePlanner::default().plan(&def).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::SlotCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_duplicate_slot_weekday() {
        let mut def = definition(RecurrencePattern::Custom, 24.0, 2.0);
        def.sessions_per_week = 2;
        def.slots = vec![SessionSlot::new(1, 9, 0), SessionSlot::new(1, 14, 0)];

        let err = RecurrencePlanner::validate_slots(&def).unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateSlotWeekday { weekday: 1 }));
    }

    #[test]
    fn test_explicit_slots_walk_days_in_order() {
        let mut def = definition(RecurrencePattern::Custom, 8.0, 2.0);
        def.sessions_per_week = 2;
        // Thursday given first on purpose
        def.slots = vec![SessionSlot::new(3, 18, 30), SessionSlot::new(1, 10, 0)];

        let sessions = RecurrencePlanner::default().plan(&def).unwrap();
        let dates: Vec<_> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 10, 7), date(2025, 10, 9), date(2025, 10, 14), date(2025, 10, 16)]
        );
        assert_eq!(sessions[1].start_time, time(18, 30));
        assert_eq!(sessions[1].end_time, time(20, 30));
        assert_eq!(sessions[2].week_number, 2);
        assert_dense(&sessions);
    }

    #[test]
    fn test_bi_weekly_skips_alternate_weeks() {
        let sessions = RecurrencePlanner::default()
            .plan(&definition(RecurrencePattern::BiWeekly, 3.0, 1.0))
            .unwrap();
        let dates: Vec<_> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(2025, 10, 6), date(2025, 10, 20), date(2025, 11, 3)]);
        assert_eq!(sessions[2].week_number, 5);
    }

    #[test]
    fn test_monthly_skips_short_months() {
        let mut def = definition(RecurrencePattern::Monthly, 3.0, 1.0);
        def.start_date = date(2025, 1, 31);
        let sessions = RecurrencePlanner::default().plan(&def).unwrap();
        let dates: Vec<_> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(2025, 1, 31), date(2025, 3, 31), date(2025, 5, 31)]);
    }

    #[test]
    fn test_once_emits_single_session() {
        let sessions = RecurrencePlanner::default()
            .plan(&definition(RecurrencePattern::Once, 6.0, 2.0))
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].date, date(2025, 10, 6));
    }

    #[test]
    fn test_generation_cap() {
        let planner = RecurrencePlanner::new(60);
        let err = planner.plan(&definition(RecurrencePattern::Weekly, 20.0, 1.0)).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::UnboundedGeneration {
                generated: 9,
                required: 20,
                ..
            }
        ));
    }

    #[test]
    fn test_huge_hour_total_fails_without_generating() {
        let planner = RecurrencePlanner::default();
        let err = planner.plan(&definition(RecurrencePattern::Daily, 1e12, 1.0)).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::UnboundedGeneration {
                generated: 0,
                required: u32::MAX,
                max_days: 730
            }
        ));

        let mut def = definition(RecurrencePattern::Custom, 1e12, 1.0);
        def.sessions_per_week = 2;
        def.slots = vec![SessionSlot::new(0, 9, 0), SessionSlot::new(3, 9, 0)];
        assert!(matches!(
            planner.plan(&def).unwrap_err(),
            ScheduleError::UnboundedGeneration { generated: 0, .. }
        ));

        // A one-off stays a single session however many hours are given
        assert_eq!(planner.plan(&definition(RecurrencePattern::Once, 1e12, 1.0)).unwrap().len(), 1);
    }

    #[test]
    fn test_session_crossing_midnight_rejected() {
        let mut def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        def.start_time = Some(time(23, 0));
        let err = RecurrencePlanner::default().plan(&def).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidSlot { .. }));
    }

    #[test]
    fn test_legacy_requires_start_time() {
        let mut def = definition(RecurrencePattern::Weekly, 4.0, 2.0);
        def.start_time = None;
        let err = RecurrencePlanner::default().plan(&def).unwrap_err();
        assert!(matches!(err, ScheduleError::MissingStartTime));
    }

    #[test]
    fn test_non_class_sessions_start_scheduled() {
        let mut def = definition(RecurrencePattern::Weekly, 2.0, 1.0);
        def.target = ScheduleTarget::Meeting {
            participants: vec![3, 4],
        };
        let sessions = RecurrencePlanner::default().plan(&def).unwrap();
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Scheduled));
    }
}
