//! Textual date literals used to request quote ranges.
//!
//! Quote endpoints take human-readable dates such as `"Jan 1 1990"`. Parsing is
//! deliberately shallow: the month must be one of the twelve fixed
//! abbreviations, the day must fall in 1–31 and the year in a configured range.
//! Day-in-month validity is NOT checked, so `"Feb 30 2000"` is accepted.
//! A bare integer year (`"1990"`) is accepted as January 1 of that year.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The fixed month abbreviations accepted in a date literal.
pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Validation failures for user-supplied literals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("incorrect month in date literal '{0}'")]
    Month(String),

    #[error("incorrect day in date literal '{0}'")]
    Day(String),

    #[error("incorrect year in date literal '{literal}' (expected {min}..={max})")]
    Year { literal: String, min: i32, max: i32 },

    #[error("malformed date literal '{0}' (expected e.g. 'Jan 1 1990')")]
    Malformed(String),

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: String, end: String },

    #[error("not a number: '{0}'")]
    NotNumeric(String),
}

/// Inclusive range of plausible years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            min: 1900,
            max: 2016,
        }
    }
}

/// A parsed `Mon D YYYY` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateLiteral {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
    /// 1–31, not checked against the month length.
    pub day: u32,
}

impl DateLiteral {
    /// Parse a literal such as `"Jan 1 1990"` or a bare year such as `"1990"`.
    pub fn parse(literal: &str, years: &YearRange) -> Result<Self, ValidationError> {
        let trimmed = literal.trim();

        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            let year = parse_year(trimmed, literal, years)?;
            return Ok(Self {
                year,
                month: 1,
                day: 1,
            });
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let [month, day, year] = parts.as_slice() else {
            return Err(ValidationError::Malformed(literal.to_string()));
        };

        let month = MONTHS
            .iter()
            .position(|m| m == month)
            .map(|i| i as u32 + 1)
            .ok_or_else(|| ValidationError::Month(literal.to_string()))?;

        let day = day
            .trim_end_matches(',')
            .parse::<u32>()
            .ok()
            .filter(|d| (1..=31).contains(d))
            .ok_or_else(|| ValidationError::Day(literal.to_string()))?;

        let year = parse_year(year, literal, years)?;

        Ok(Self { year, month, day })
    }

    /// The calendar date to request. An impossible day (e.g. Feb 30) is
    /// clamped to the last day of that month. A year outside chrono's
    /// calendar maps to `NaiveDate::MIN`; `AnalysisConfig::validate` rejects
    /// year ranges that could produce one.
    pub fn to_naive_date(&self) -> NaiveDate {
        (28..=self.day)
            .rev()
            .find_map(|d| NaiveDate::from_ymd_opt(self.year, self.month, d))
            .or_else(|| NaiveDate::from_ymd_opt(self.year, self.month, self.day))
            .unwrap_or(NaiveDate::MIN)
    }

    /// URL encoding used by textual quote endpoints: `Jan+1%2C+1990`.
    pub fn url_form(&self) -> String {
        format!("{}+{}%2C+{}", self.month_abbrev(), self.day, self.year)
    }

    pub fn month_abbrev(&self) -> &'static str {
        MONTHS[(self.month as usize - 1) % 12]
    }
}

impl fmt::Display for DateLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.month_abbrev(), self.day, self.year)
    }
}

impl From<NaiveDate> for DateLiteral {
    fn from(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// Parse a start/end pair and check that the range is not inverted.
pub fn parse_range(
    start: &str,
    end: &str,
    years: &YearRange,
) -> Result<(DateLiteral, DateLiteral), ValidationError> {
    let s = DateLiteral::parse(start, years)?;
    let e = DateLiteral::parse(end, years)?;
    if s.to_naive_date() > e.to_naive_date() {
        return Err(ValidationError::InvertedRange {
            start: s.to_string(),
            end: e.to_string(),
        });
    }
    Ok((s, e))
}

fn parse_year(token: &str, literal: &str, years: &YearRange) -> Result<i32, ValidationError> {
    token
        .parse::<i32>()
        .ok()
        .filter(|y| years.contains(*y))
        .ok_or_else(|| ValidationError::Year {
            literal: literal.to_string(),
            min: years.min,
            max: years.max,
        })
}
