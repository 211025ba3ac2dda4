//! Minimal iCalendar reader for the fallback holiday source.
//!
//! Only `DTSTART` / `SUMMARY` pairs are read; everything else in the feed is
//! ignored. Folded lines (continuations starting with a space or tab) are
//! unfolded before matching.

use regex::Regex;
use std::sync::LazyLock;

use super::{parse_holiday_date, HolidayCalendar};

static DTSTART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DTSTART(?:;[^:]*)?:(\d{8})").unwrap());
static SUMMARY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SUMMARY(?:;[^:]*)?:(.*)$").unwrap());

/// Parses holiday date+summary pairs out of an iCalendar body.
pub fn parse_ics(body: &str) -> HolidayCalendar {
    let mut calendar = HolidayCalendar::new();
    let mut date = None;
    let mut summary: Option<String> = None;

    for line in unfold(body) {
        let line = line.trim_end();

        if line == "BEGIN:VEVENT" {
            date = None;
            summary = None;
            continue;
        }

        if let Some(caps) = DTSTART_REGEX.captures(line) {
            date = caps.get(1).and_then(|m| parse_holiday_date(m.as_str()));
        } else if let Some(caps) = SUMMARY_REGEX.captures(line) {
            summary = caps.get(1).map(|m| unescape(m.as_str().trim()));
        }

        if let (Some(d), Some(name)) = (date, summary.as_ref()) {
            calendar.insert(d, name.clone());
            date = None;
            summary = None;
        }
    }

    calendar
}

fn unfold(body: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in body.lines() {
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&raw[1..]);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn unescape(value: &str) -> String {
    value
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\n", " ")
        .replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20251003\r\n\
DTEND;VALUE=DATE:20251004\r\n\
SUMMARY:개천절\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY;LANGUAGE=en:Hangul\r\n  Day\r\n\
DTSTART;VALUE=DATE:20251009\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20251003\r\n\
SUMMARY:National Foundation Day\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parses_pairs_in_either_order() {
        let calendar = parse_ics(FEED);
        assert_eq!(calendar.len(), 2);
        assert_eq!(
            calendar.name_on(NaiveDate::from_ymd_opt(2025, 10, 3).unwrap()),
            Some("개천절")
        );
        assert_eq!(
            calendar.name_on(NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()),
            Some("Hangul Day")
        );
    }

    #[test]
    fn test_empty_feed() {
        assert!(parse_ics("BEGIN:VCALENDAR\nEND:VCALENDAR\n").is_empty());
    }
}
