//! Public holiday lookup.
//!
//! Holidays are fetched per year from an upstream provider and collected
//! into a [`HolidayCalendar`], a date-keyed map deduplicated across sources.

mod cache;
mod client;
mod error;
mod ics;

pub use cache::{CacheStats, CircuitBreaker, YearCache};
pub use client::{HolidayClient, HolidayClientConfig};
pub use error::HolidayError;
pub use ics::parse_ics;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One public holiday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    pub date: NaiveDate,
    pub localized_name: String,
}

/// Holiday names keyed by date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    entries: BTreeMap<NaiveDate, String>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a calendar; the first name seen for a date wins.
    pub fn from_entries(entries: impl IntoIterator<Item = HolidayEntry>) -> Self {
        let mut calendar = Self::new();
        for entry in entries {
            calendar.insert(entry.date, entry.localized_name);
        }
        calendar
    }

    /// Inserts unless the date is already present.
    pub fn insert(&mut self, date: NaiveDate, name: impl Into<String>) -> bool {
        if self.entries.contains_key(&date) {
            return false;
        }
        self.entries.insert(date, name.into());
        true
    }

    /// Adds every entry of `other` whose date isn't known yet.
    pub fn merge(&mut self, other: &HolidayCalendar) {
        for (date, name) in &other.entries {
            self.insert(*date, name.clone());
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    pub fn name_on(&self, date: NaiveDate) -> Option<&str> {
        self.entries.get(&date).map(String::as_str)
    }

    /// Looks a holiday up by a date string in any supported format.
    pub fn name_for(&self, raw: &str) -> Option<&str> {
        parse_holiday_date(raw).and_then(|date| self.name_on(date))
    }

    /// Holidays falling in `year`.
    pub fn for_year(&self, year: i32) -> HolidayCalendar {
        HolidayCalendar {
            entries: self
                .entries
                .iter()
                .filter(|(date, _)| date.year() == year)
                .map(|(date, name)| (*date, name.clone()))
                .collect(),
        }
    }

    pub fn entries(&self) -> Vec<HolidayEntry> {
        self.entries
            .iter()
            .map(|(date, name)| HolidayEntry {
                date: *date,
                localized_name: name.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses `YYYY-MM-DD`, `YYYYMMDD`, `YYYY/MM/DD`, `DD/MM/YYYY` and
/// RFC 3339 timestamps (date part only).
pub fn parse_holiday_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    const FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%d/%m/%Y"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| trimmed.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Source of public holidays for a year range.
#[async_trait]
pub trait HolidayProvider: Send + Sync {
    /// Returns every known holiday in `[start_year, end_year]`.
    async fn fetch_holidays(&self, start_year: i32, end_year: i32) -> Result<HolidayCalendar, HolidayError>;
}

/// Fixed holiday list.
#[derive(Debug, Clone, Default)]
pub struct StaticHolidayProvider {
    calendar: HolidayCalendar,
}

impl StaticHolidayProvider {
    pub fn new(calendar: HolidayCalendar) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl HolidayProvider for StaticHolidayProvider {
    async fn fetch_holidays(&self, start_year: i32, end_year: i32) -> Result<HolidayCalendar, HolidayError> {
        let mut result = HolidayCalendar::new();
        for year in start_year..=end_year {
            result.merge(&self.calendar.for_year(year));
        }
        Ok(result)
    }
}

/// Public holidays from an inner provider plus fixed closure days.
///
/// The inner provider's name wins when both list the same date. Inner
/// failures are returned unchanged.
pub struct ClosureCalendarProvider {
    inner: Arc<dyn HolidayProvider>,
    closures: HolidayCalendar,
}

impl ClosureCalendarProvider {
    pub fn new(inner: Arc<dyn HolidayProvider>, closures: HolidayCalendar) -> Self {
        Self { inner, closures }
    }
}

#[async_trait]
impl HolidayProvider for ClosureCalendarProvider {
    async fn fetch_holidays(&self, start_year: i32, end_year: i32) -> Result<HolidayCalendar, HolidayError> {
        let mut calendar = self.inner.fetch_holidays(start_year, end_year).await?;
        for year in start_year..=end_year {
            calendar.merge(&self.closures.for_year(year));
        }
        Ok(calendar)
    }
}
