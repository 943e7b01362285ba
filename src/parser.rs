//! Cron expression parser
//!
//! Supports standard 5-field cron syntax:
//! ```text
//! ┌───────────── minute (0-59)
//! │ ┌───────────── hour (0-23)
//! │ │ ┌───────────── day of month (1-31)
//! │ │ │ ┌───────────── month (1-12 or JAN-DEC)
//! │ │ │ │ ┌───────────── day of week (0-6 or SUN-SAT, 0=Sunday)
//! │ │ │ │ │
//! * * * * *
//! ```
//!
//! Special characters:
//! - `*` - any value
//! - `,` - value list separator (e.g., `1,3,5`)
//! - `-` - range (e.g., `1-5`)
//! - `/` - step (e.g., `*/5`, `0-30/5` or `10/15`)
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either field matches (classic cron behaviour).
//!
//! All computations are in UTC.

use crate::error::{JobError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Years searched ahead before an expression is declared unsatisfiable.
/// Eight covers the gap between Feb 29ths across a skipped century leap year.
const SEARCH_YEARS: i32 = 8;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronExpression {
    /// Original expression string
    pub expression: String,
    /// Allowed minutes (0-59)
    minutes: BTreeSet<u32>,
    /// Allowed hours (0-23)
    hours: BTreeSet<u32>,
    /// Allowed days of month (1-31)
    days: BTreeSet<u32>,
    /// Allowed months (1-12)
    months: BTreeSet<u32>,
    /// Allowed days of week (0-6, 0=Sunday)
    weekdays: BTreeSet<u32>,
    /// Day-of-month field was not a wildcard
    days_restricted: bool,
    /// Day-of-week field was not a wildcard
    weekdays_restricted: bool,
}

impl CronExpression {
    /// Parse a cron expression string
    ///
    /// # Examples
    ///
    /// ```
    /// use chartjobs::CronExpression;
    ///
    /// // Every 5 minutes
    /// let expr = CronExpression::parse("*/5 * * * *").unwrap();
    ///
    /// // Every day at midnight
    /// let expr = CronExpression::parse("0 0 * * *").unwrap();
    ///
    /// // Weekdays at 9 AM
    /// let expr = CronExpression::parse("0 9 * * MON-FRI").unwrap();
    /// ```
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() != 5 {
            return Err(JobError::InvalidExpression(format!(
                "Expected 5 fields, got {}",
                parts.len()
            )));
        }

        let minutes = parse_field(parts[0], 0, 59, "minute", &[])?;
        let hours = parse_field(parts[1], 0, 23, "hour", &[])?;
        let days = parse_field(parts[2], 1, 31, "day", &[])?;
        let months = parse_field(parts[3], 1, 12, "month", &MONTH_NAMES)?;
        let weekdays = parse_field(parts[4], 0, 6, "weekday", &WEEKDAY_NAMES)?;

        Ok(Self {
            expression: parts.join(" "),
            minutes,
            hours,
            days,
            months,
            weekdays,
            days_restricted: !parts[2].starts_with('*'),
            weekdays_restricted: !parts[4].starts_with('*'),
        })
    }

    /// Calculate the next fire time strictly after the given datetime
    ///
    /// Returns `None` when nothing matches within the search horizon
    /// (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Start from the next whole minute
        let base = after.naive_utc().with_second(0)?.with_nanosecond(0)?;
        let mut current = base + Duration::minutes(1);
        let last_year = current.year() + SEARCH_YEARS;

        while current.year() <= last_year {
            if !self.months.contains(&current.month()) {
                current = first_of_next_month(current)?;
                continue;
            }
            if !self.day_matches(current.date()) {
                current = current.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(&current.hour()) {
                current = current.date().and_hms_opt(current.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(&current.minute()) {
                current += Duration::minutes(1);
                continue;
            }
            return Some(Utc.from_utc_datetime(&current));
        }

        None
    }

    /// The next `count` fire times after `from`
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }

    /// Check if a datetime matches this cron expression
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.months.contains(&dt.month())
            && self.day_matches(dt.date_naive())
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day = self.days.contains(&date.day());
        let weekday = self
            .weekdays
            .contains(&date.weekday().num_days_from_sunday());

        if self.days_restricted && self.weekdays_restricted {
            day || weekday
        } else {
            day && weekday
        }
    }

    /// Get a human-readable description of the schedule
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();

        // Minutes
        match single(&self.minutes) {
            _ if self.minutes.len() == 60 => parts.push("every minute".to_string()),
            Some(0) => parts.push("at the start of the hour".to_string()),
            Some(min) => parts.push(format!("at minute {}", min)),
            None => parts.push(format!("at minutes {:?}", self.minutes)),
        }

        // Hours
        if self.hours.len() < 24 {
            match single(&self.hours) {
                Some(hour) => parts.push(format!("at {}:00", hour)),
                None => parts.push(format!("during hours {:?}", self.hours)),
            }
        }

        if self.days.len() < 31 {
            parts.push(format!("on days {:?}", self.days));
        }

        if self.months.len() < 12 {
            parts.push(format!("in months {:?}", self.months));
        }

        if self.weekdays.len() < 7 {
            let weekday_names: Vec<&str> = self
                .weekdays
                .iter()
                .map(|&d| match d {
                    0 => "Sun",
                    1 => "Mon",
                    2 => "Tue",
                    3 => "Wed",
                    4 => "Thu",
                    5 => "Fri",
                    6 => "Sat",
                    _ => "?",
                })
                .collect();
            parts.push(format!("on {}", weekday_names.join(", ")));
        }

        parts.join(", ")
    }
}

impl FromStr for CronExpression {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Compute the earliest fire instant strictly after `reference` (default: now)
///
/// Fails with [`JobError::InvalidExpression`] when the expression does not
/// parse or never fires.
pub fn next_fire_after(
    expression: &str,
    reference: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    let expr = CronExpression::parse(expression)?;
    let reference = reference.unwrap_or_else(Utc::now);
    expr.next_after(reference).ok_or_else(|| {
        JobError::InvalidExpression(format!(
            "'{}' has no fire time after {}",
            expression,
            reference.to_rfc3339()
        ))
    })
}

fn single(values: &BTreeSet<u32>) -> Option<u32> {
    if values.len() == 1 {
        values.iter().next().copied()
    } else {
        None
    }
}

fn first_of_next_month(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Parse one value, accepting a three-letter name where the field has names
fn parse_value(token: &str, min: u32, names: &[&str], name: &str) -> Result<u32> {
    if is_digits(token) {
        return token.parse::<u32>().map_err(|_| {
            JobError::InvalidExpression(format!("Value '{}' out of range in {}", token, name))
        });
    }
    let lower = token.to_ascii_lowercase();
    names
        .iter()
        .position(|n| *n == lower)
        .map(|idx| idx as u32 + min)
        .ok_or_else(|| {
            JobError::InvalidExpression(format!("Invalid value '{}' in {}", token, name))
        })
}

/// Parse a single cron field
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    name: &str,
    names: &[&str],
) -> Result<BTreeSet<u32>> {
    let mut values = BTreeSet::new();

    for part in field.split(',') {
        if part.is_empty() {
            return Err(JobError::InvalidExpression(format!(
                "Empty list element in {}",
                name
            )));
        }

        // Handle step values (e.g., */5 or 0-30/5)
        let (range_part, step) = match part.split_once('/') {
            Some((range, step_str)) => {
                let step = is_digits(step_str)
                    .then(|| step_str.parse::<u32>().ok())
                    .flatten()
                    .ok_or_else(|| {
                        JobError::InvalidExpression(format!(
                            "Invalid step value '{}' in {}",
                            step_str, name
                        ))
                    })?;
                if step == 0 {
                    return Err(JobError::InvalidExpression(format!(
                        "Step value cannot be 0 in {}",
                        name
                    )));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            (
                parse_value(lo, min, names, name)?,
                parse_value(hi, min, names, name)?,
            )
        } else {
            let value = parse_value(range_part, min, names, name)?;
            // `a/n` runs from a to the end of the field
            if step.is_some() {
                (value, max)
            } else {
                (value, value)
            }
        };

        for value in [start, end] {
            if value < min || value > max {
                return Err(JobError::InvalidExpression(format!(
                    "Value {} out of range ({}-{}) in {}",
                    value, min, max, name
                )));
            }
        }
        if start > end {
            return Err(JobError::InvalidExpression(format!(
                "Invalid range {}-{} in {}",
                start, end, name
            )));
        }

        let step = step.unwrap_or(1);
        values.extend((start..=end).step_by(step as usize));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_every_minute() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.hours.len(), 24);
        assert_eq!(expr.days.len(), 31);
        assert_eq!(expr.months.len(), 12);
        assert_eq!(expr.weekdays.len(), 7);
    }

    #[test]
    fn test_parse_step() {
        let expr = CronExpression::parse("*/15 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0, 15, 30, 45]));
    }

    #[test]
    fn test_parse_range_with_step() {
        let expr = CronExpression::parse("0-30/10 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0, 10, 20, 30]));
    }

    #[test]
    fn test_parse_start_with_step() {
        let expr = CronExpression::parse("45/5 * * * *").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([45, 50, 55]));
    }

    #[test]
    fn test_parse_list_and_names() {
        let expr = CronExpression::parse("0 0 * jan,Jul mon-fri").unwrap();
        assert_eq!(expr.months, BTreeSet::from([1, 7]));
        assert_eq!(expr.weekdays, BTreeSet::from([1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_parse_normalizes_whitespace() {
        let expr = CronExpression::parse("  0   0 * *  * ").unwrap();
        assert_eq!(expr.expression, "0 0 * * *");
        assert_eq!(expr.to_string(), "0 0 * * *");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in [
            "bad cron",
            "* * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * 32 * *",
            "* * * 13 *",
            "* * * * 7",
            "30-10 * * * *",
            "*/0 * * * *",
            "1,,2 * * * *",
            "a * * * *",
            "* * * foo *",
            "+5 * * * *",
            "*/+2 * * * *",
            "1-+3 * * * *",
        ] {
            assert!(
                matches!(CronExpression::parse(bad), Err(JobError::InvalidExpression(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_next_after_is_strictly_later() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        let now = at(2026, 2, 5, 10, 30, 0);
        assert_eq!(expr.next_after(now).unwrap(), at(2026, 2, 5, 10, 31, 0));

        let mid_minute = at(2026, 2, 5, 10, 30, 42);
        assert_eq!(expr.next_after(mid_minute).unwrap(), at(2026, 2, 5, 10, 31, 0));
    }

    #[test]
    fn test_next_midnight() {
        let expr = CronExpression::parse("0 0 * * *").unwrap();
        let now = at(2026, 10, 19, 13, 5, 0);
        assert_eq!(expr.next_after(now).unwrap(), at(2026, 10, 20, 0, 0, 0));

        // Exactly at midnight moves to the following one
        let midnight = at(2026, 10, 20, 0, 0, 0);
        assert_eq!(expr.next_after(midnight).unwrap(), at(2026, 10, 21, 0, 0, 0));
    }

    #[test]
    fn test_next_after_crosses_year() {
        let expr = CronExpression::parse("30 6 1 1 *").unwrap();
        let now = at(2026, 3, 1, 0, 0, 0);
        assert_eq!(expr.next_after(now).unwrap(), at(2027, 1, 1, 6, 30, 0));
    }

    #[test]
    fn test_next_after_leap_day() {
        let expr = CronExpression::parse("0 12 29 2 *").unwrap();
        let now = at(2026, 1, 1, 0, 0, 0);
        assert_eq!(expr.next_after(now).unwrap(), at(2028, 2, 29, 12, 0, 0));
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // 13th of the month or any Friday
        let expr = CronExpression::parse("0 0 13 * 5").unwrap();
        // 2026-02-05 is a Thursday, next Friday is the 6th
        let now = at(2026, 2, 5, 1, 0, 0);
        assert_eq!(expr.next_after(now).unwrap(), at(2026, 2, 6, 0, 0, 0));

        // Wildcard day-of-month keeps weekday filtering exclusive
        let expr = CronExpression::parse("0 9 * * 1").unwrap();
        assert_eq!(expr.next_after(now).unwrap(), at(2026, 2, 9, 9, 0, 0));
    }

    #[test]
    fn test_never_fires() {
        let expr = CronExpression::parse("0 0 30 2 *").unwrap();
        assert!(expr.next_after(at(2026, 1, 1, 0, 0, 0)).is_none());

        let err = next_fire_after("0 0 30 2 *", None).unwrap_err();
        assert!(matches!(err, JobError::InvalidExpression(_)));
    }

    #[test]
    fn test_next_fire_after_defaults_to_now() {
        let before = Utc::now();
        let next = next_fire_after("*/5 * * * *", None).unwrap();
        assert!(next > before);
        assert_eq!(next.minute() % 5, 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_next_fire_satisfies_fields() {
        let reference = at(2026, 7, 14, 23, 59, 59);
        for expression in ["*/7 3-5 * * *", "15 10 1,15 * *", "0 */6 * 3-9 sat,sun", "5 4 * * 0"] {
            let expr = CronExpression::parse(expression).unwrap();
            let next = next_fire_after(expression, Some(reference)).unwrap();
            assert!(next > reference, "{}", expression);
            assert!(expr.matches(&next), "{}", expression);
        }
    }

    #[test]
    fn test_upcoming() {
        let expr = CronExpression::parse("0 */12 * * *").unwrap();
        let times = expr.upcoming(at(2026, 2, 5, 10, 0, 0), 3);
        assert_eq!(
            times,
            vec![
                at(2026, 2, 5, 12, 0, 0),
                at(2026, 2, 6, 0, 0, 0),
                at(2026, 2, 6, 12, 0, 0)
            ]
        );
    }

    #[test]
    fn test_matches() {
        let expr = CronExpression::parse("30 14 * * 1").unwrap();
        // Monday, Feb 2, 2026 at 14:30
        assert!(expr.matches(&at(2026, 2, 2, 14, 30, 0)));
        // Same time but Tuesday
        assert!(!expr.matches(&at(2026, 2, 3, 14, 30, 0)));
    }

    #[test]
    fn test_describe() {
        let expr = CronExpression::parse("0 9 * * 1-5").unwrap();
        let desc = expr.describe();
        assert!(desc.contains("at the start of the hour"));
        assert!(desc.contains("Mon"));
        assert!(desc.contains("Fri"));
    }
}
