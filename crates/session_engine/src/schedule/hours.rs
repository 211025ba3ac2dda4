/// Branch operating-hours validation
use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::error::ScheduleError;
use super::types::SessionSlot;

/// A branch's daily operating window in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHours {
    pub open_minutes: u32,
    pub close_minutes: u32,
}

impl BranchHours {
    /// 08:00-21:00
    pub const DEFAULT: BranchHours = BranchHours {
        open_minutes: 8 * 60,
        close_minutes: 21 * 60,
    };

    pub fn new(open_minutes: u32, close_minutes: u32) -> Self {
        Self {
            open_minutes,
            close_minutes,
        }
    }

    /// Window must be non-empty and close by midnight (1440).
    pub fn is_valid(&self) -> bool {
        self.open_minutes < self.close_minutes && self.close_minutes <= MINUTES_PER_DAY
    }

    /// Falls back to [`BranchHours::DEFAULT`] when unset or nonsensical.
    pub fn or_default(hours: Option<BranchHours>) -> BranchHours {
        match hours {
            Some(h) if h.is_valid() => h,
            _ => BranchHours::DEFAULT,
        }
    }

    pub fn open_time(&self) -> NaiveTime {
        minutes_to_time(self.open_minutes)
    }

    pub fn close_time(&self) -> NaiveTime {
        minutes_to_time(self.close_minutes)
    }
}

impl Default for BranchHours {
    fn default() -> Self {
        BranchHours::DEFAULT
    }
}

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Midnight closing has no `NaiveTime`; it reads as the last second of the day.
fn minutes_to_time(minutes: u32) -> NaiveTime {
    if minutes >= MINUTES_PER_DAY {
        return NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    }
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Checks slots against a branch operating window.
#[derive(Debug, Clone, Copy)]
pub struct BranchHoursValidator {
    hours: BranchHours,
}

impl BranchHoursValidator {
    pub fn new(hours: Option<BranchHours>) -> Self {
        Self {
            hours: BranchHours::or_default(hours),
        }
    }

    pub fn hours(&self) -> BranchHours {
        self.hours
    }

    /// Validates one weekday/start pair with the given session length.
    pub fn validate(&self, weekday: u8, start: NaiveTime, duration_minutes: i64) -> Result<(), ScheduleError> {
        let start_minutes = start.hour() * 60 + start.minute();
        let end_minutes = start_minutes as i64 + duration_minutes;

        if start_minutes >= self.hours.open_minutes && end_minutes <= self.hours.close_minutes as i64 {
            return Ok(());
        }

        // Reported even when the session would wrap past midnight
        let (end_time, _) = start.overflowing_add_signed(Duration::minutes(duration_minutes));

        Err(ScheduleError::OutOfOperatingHours {
            weekday,
            start_time: start,
            end_time,
            open: self.hours.open_time(),
            close: self.hours.close_time(),
        })
    }

    pub fn validate_slot(&self, slot: &SessionSlot, duration_minutes: i64) -> Result<(), ScheduleError> {
        let start = slot.start_time().ok_or_else(|| ScheduleError::InvalidSlot {
            message: format!("{:02}:{:02} is not a valid start time", slot.start_hour, slot.start_minute),
        })?;
        self.validate(slot.weekday, start, duration_minutes)
    }

    /// Validates every slot; the first offending slot is returned.
    pub fn validate_all(&self, slots: &[SessionSlot], duration_minutes: i64) -> Result<(), ScheduleError> {
        for slot in slots {
            self.validate_slot(slot, duration_minutes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_out_of_hours_names_weekday_and_time() {
        let validator = BranchHoursValidator::new(Some(BranchHours::new(10 * 60, 20 * 60)));
        let err = validator.validate_slot(&SessionSlot::new(6, 21, 0), 60).unwrap_err();

        match err {
            ScheduleError::OutOfOperatingHours {
                weekday,
                start_time,
                end_time,
                ..
            } => {
                assert_eq!(weekday, 6);
                assert_eq!(start_time, time(21, 0));
                assert_eq!(end_time, time(22, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_session_ending_at_close_is_accepted() {
        let validator = BranchHoursValidator::new(Some(BranchHours::new(10 * 60, 20 * 60)));
        assert!(validator.validate(2, time(18, 0), 120).is_ok());
        assert!(validator.validate(2, time(18, 30), 120).is_err());
        assert!(validator.validate(2, time(9, 59), 30).is_err());
    }

    #[test]
    fn test_default_window_when_hours_missing_or_invalid() {
        assert_eq!(BranchHoursValidator::new(None).hours(), BranchHours::DEFAULT);

        let inverted = BranchHoursValidator::new(Some(BranchHours::new(20 * 60, 9 * 60)));
        assert_eq!(inverted.hours(), BranchHours::DEFAULT);
        assert!(inverted.validate(0, time(8, 0), 60).is_ok());
        assert!(inverted.validate(0, time(20, 30), 60).is_err());
    }

    #[test]
    fn test_branch_open_until_midnight() {
        let hours = BranchHours::new(9 * 60, 24 * 60);
        assert!(hours.is_valid());
        assert_eq!(hours.close_time(), NaiveTime::from_hms_opt(23, 59, 59).unwrap());

        let validator = BranchHoursValidator::new(Some(hours));
        assert_eq!(validator.hours(), hours);
        assert!(validator.validate(4, time(22, 0), 60).is_ok());
        assert!(validator.validate(4, time(8, 30), 60).is_err());

        assert!(!BranchHours::new(9 * 60, 24 * 60 + 1).is_valid());
    }
}
