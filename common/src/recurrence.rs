// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Recurring events: pattern validation, description and on-demand
//! generation of concrete calendar dates.
//!
//! Weekdays are numbered 0 (Sunday) to 6 (Saturday). All computations use
//! plain calendar dates, no timezone is involved.

use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

fn default_interval() -> u32 {
    1
}

/// Most instances a single generation may return, and the largest accepted
/// `occurrences` count.
pub const MAX_INSTANCES: usize = 10_000;

/// A repetition rule. It describes when an event happens, the
/// occurrences themselves are never stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringPattern {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u32>,
}

impl RecurringPattern {
    pub fn new(kind: RecurrenceType, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: None,
            day_of_month: None,
            end_date: None,
            occurrences: None,
        }
    }
}

/// Outcome of [`validate_pattern`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid recurring pattern: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("Recurring pattern needs an end date, an occurrence count or a range end.")]
    Unbounded,
    #[error("Recurring pattern yields more than {0} instances in the requested range.")]
    TooManyInstances(usize),
}

/// Checks the structural rules of a pattern and lists every violation.
pub fn validate_pattern(pattern: &RecurringPattern) -> ValidationResult {
    let mut errors = Vec::new();

    if pattern.interval < 1 {
        errors.push("Interval must be at least 1.".to_string());
    }
    if pattern.kind == RecurrenceType::Weekly {
        if let Some(days) = &pattern.days_of_week {
            if days.is_empty() {
                errors.push("Weekly patterns must select at least one day of the week.".to_string());
            }
            if days.iter().any(|day| *day > 6) {
                errors.push(
                    "Days of week must be between 0 (Sunday) and 6 (Saturday).".to_string(),
                );
            }
        }
    }
    if pattern.kind == RecurrenceType::Monthly {
        if let Some(day) = pattern.day_of_month {
            if !(1..=31).contains(&day) {
                errors.push("Day of month must be between 1 and 31.".to_string());
            }
        }
    }
    if pattern.end_date.is_some() && pattern.occurrences.is_some() {
        errors.push("Specify either an end date or a number of occurrences, not both.".to_string());
    }
    match pattern.occurrences {
        Some(0) => errors.push("Occurrences must be at least 1.".to_string()),
        Some(count) if count as usize > MAX_INSTANCES => {
            errors.push(format!("Occurrences must be at most {MAX_INSTANCES}."))
        }
        _ => {}
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

/// Computes the dates of `pattern`, started on `start`, that fall within
/// `[range_start, range_end]`, in ascending order.
///
/// With an `occurrences` limit the walk begins at `start`, so instances
/// before the range still use up the limit. More than [`MAX_INSTANCES`]
/// dates in the range is an error.
pub fn generate_dates(
    pattern: &RecurringPattern,
    start: NaiveDate,
    range_start: NaiveDate,
    range_end: Option<NaiveDate>,
) -> Result<Vec<NaiveDate>, PatternError> {
    let report = validate_pattern(pattern);
    if !report.valid {
        return Err(PatternError::Invalid(report.errors));
    }
    if range_end.is_none() && pattern.end_date.is_none() && pattern.occurrences.is_none() {
        return Err(PatternError::Unbounded);
    }

    let from = match pattern.occurrences {
        Some(_) => start,
        None => start.max(range_start),
    };

    let mut dates = Vec::new();
    let mut matched = 0u32;
    for date in Candidates::new(pattern, start, from) {
        if pattern.end_date.is_some_and(|end| date > end)
            || range_end.is_some_and(|end| date > end)
        {
            break;
        }
        matched += 1;
        if date >= range_start {
            if dates.len() == MAX_INSTANCES {
                return Err(PatternError::TooManyInstances(MAX_INSTANCES));
            }
            dates.push(date);
        }
        if pattern.occurrences.is_some_and(|limit| matched >= limit) {
            break;
        }
    }
    Ok(dates)
}

/// Ascending dates matching a pattern, from `from` onward. Unbounded: the
/// caller applies the termination conditions.
struct Candidates<'a> {
    pattern: &'a RecurringPattern,
    start: NaiveDate,
    from: NaiveDate,
    cursor: Cursor,
}

#[derive(Clone, Copy)]
enum Cursor {
    /// Next day to examine (daily and weekly patterns).
    Day(NaiveDate),
    /// Months elapsed since the start month (monthly and yearly patterns).
    Month(u32),
    Done,
}

impl<'a> Candidates<'a> {
    fn new(pattern: &'a RecurringPattern, start: NaiveDate, from: NaiveDate) -> Self {
        let cursor = match pattern.kind {
            RecurrenceType::Daily | RecurrenceType::Weekly => Cursor::Day(from),
            RecurrenceType::Monthly | RecurrenceType::Yearly => {
                Cursor::Month(months_between(start, from))
            }
        };
        Self {
            pattern,
            start,
            from,
            cursor,
        }
    }

    fn day_matches(&self, day: NaiveDate) -> bool {
        let interval = i64::from(self.pattern.interval);
        match self.pattern.kind {
            RecurrenceType::Daily => (day - self.start).num_days() % interval == 0,
            RecurrenceType::Weekly => {
                let weekday = weekday_index(day);
                let on_day = match &self.pattern.days_of_week {
                    Some(days) => days.contains(&weekday),
                    None => weekday == weekday_index(self.start),
                };
                let weeks = (day - self.start).num_days() / 7;
                on_day && weeks % interval == 0
            }
            RecurrenceType::Monthly | RecurrenceType::Yearly => false,
        }
    }

    /// Date of the `offset`-th month of the series, if that month is part of it.
    fn month_candidate(&self, offset: u32) -> Option<NaiveDate> {
        let interval = self.pattern.interval;
        let (year, month) = shift_month(self.start, offset)?;
        match self.pattern.kind {
            RecurrenceType::Monthly => {
                let day = self.pattern.day_of_month.unwrap_or(self.start.day());
                // A day earlier in the month than the start's completes one
                // month less.
                let elapsed = if day < self.start.day() {
                    offset.checked_sub(1)?
                } else {
                    offset
                };
                if elapsed % interval != 0 {
                    return None;
                }
                clamped_date(year, month, day)
            }
            RecurrenceType::Yearly => {
                if offset % 12 != 0 || (offset / 12) % interval != 0 {
                    return None;
                }
                clamped_date(year, month, self.start.day())
            }
            RecurrenceType::Daily | RecurrenceType::Weekly => None,
        }
    }
}

impl Iterator for Candidates<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            match self.cursor {
                Cursor::Done => return None,
                Cursor::Day(day) => {
                    self.cursor = day.succ_opt().map_or(Cursor::Done, Cursor::Day);
                    if self.day_matches(day) {
                        return Some(day);
                    }
                }
                Cursor::Month(offset) => {
                    self.cursor = offset.checked_add(1).map_or(Cursor::Done, Cursor::Month);
                    if shift_month(self.start, offset).is_none() {
                        self.cursor = Cursor::Done;
                        continue;
                    }
                    match self.month_candidate(offset) {
                        Some(date) if date >= self.from && date >= self.start => {
                            return Some(date);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn weekday_index(day: NaiveDate) -> u8 {
    day.weekday().num_days_from_sunday() as u8
}

fn months_between(earlier: NaiveDate, later: NaiveDate) -> u32 {
    let months = (later.year() - earlier.year()) * 12 + later.month() as i32
        - earlier.month() as i32;
    months.max(0) as u32
}

/// Year and month `offset` months after the month of `start`.
fn shift_month(start: NaiveDate, offset: u32) -> Option<(i32, u32)> {
    let first = start.with_day(1)?;
    let shifted = first.checked_add_months(Months::new(offset))?;
    Some((shifted.year(), shifted.month()))
}

/// Builds a date, pulling days past the end of the month back to its last day.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    first.with_day(day.clamp(1, last.day()))
}

impl fmt::Display for RecurringPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (single, unit) = match self.kind {
            RecurrenceType::Daily => ("Daily", "days"),
            RecurrenceType::Weekly => ("Weekly", "weeks"),
            RecurrenceType::Monthly => ("Monthly", "months"),
            RecurrenceType::Yearly => ("Yearly", "years"),
        };
        if self.interval <= 1 {
            f.write_str(single)?;
        } else {
            write!(f, "Every {} {unit}", self.interval)?;
        }

        match self.kind {
            RecurrenceType::Weekly => {
                if let Some(days) = &self.days_of_week {
                    let mut days = days.clone();
                    days.sort_unstable();
                    days.dedup();
                    let names = days
                        .iter()
                        .filter_map(|day| WEEKDAY_NAMES.get(usize::from(*day)).copied())
                        .collect::<Vec<_>>();
                    if !names.is_empty() {
                        write!(f, " on {}", names.join(", "))?;
                    }
                }
            }
            RecurrenceType::Monthly => {
                if let Some(day) = self.day_of_month {
                    write!(f, " on day {day}")?;
                }
            }
            RecurrenceType::Daily | RecurrenceType::Yearly => {}
        }

        if let Some(end) = self.end_date {
            write!(f, ", until {end}")?;
        }
        match self.occurrences {
            Some(1) => f.write_str(", once")?,
            Some(count) => write!(f, ", {count} times")?,
            None => {}
        }
        Ok(())
    }
}

/// A stored event that repeats according to its pattern.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecurringEvent {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub start_date: NaiveDate,
    pub pattern: RecurringPattern,
    pub created_at: DateTime<Utc>,
}

/// One materialization of a recurring event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventInstance {
    #[serde(flatten)]
    pub event: RecurringEvent,
    pub instance_date: NaiveDate,
}

impl RecurringEvent {
    pub fn instances(
        &self,
        range_start: NaiveDate,
        range_end: Option<NaiveDate>,
    ) -> Result<Vec<EventInstance>, PatternError> {
        let dates = generate_dates(&self.pattern, self.start_date, range_start, range_end)?;
        Ok(dates
            .into_iter()
            .map(|instance_date| EventInstance {
                event: self.clone(),
                instance_date,
            })
            .collect())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateRecurringEventPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub start_date: NaiveDate,
    pub pattern: RecurringPattern,
}
