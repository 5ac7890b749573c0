//! Week-of-year arithmetic and bucket keys.
//!
//! # Responsibility
//! - Compute the Thursday-anchored (ISO-8601) week number of a calendar date.
//! - Derive the (year, week) bucket that scopes one consecutive sequence.
//!
//! # Invariants
//! - All computations use calendar components only; no timezone conversion.
//! - `week_number` always returns a value in `[1, 53]`.
//! - With `YearAnchor::Calendar` the bucket year is the date's calendar year,
//!   even when the week belongs to an adjacent ISO week-year.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Selects which year stamps a bucket for a given date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum YearAnchor {
    /// Calendar year of the input date. Dec 29-31 may pair with week 1.
    #[default]
    Calendar,
    /// Year of the Thursday that anchors the week (strict ISO week-year).
    IsoWeekYear,
}

/// One (year, week) bucket that owns an independent consecutive counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub year: i32,
    pub week: u32,
}

impl BucketKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// Derives the bucket for `date` under the given year anchor.
    pub fn for_date(date: NaiveDate, anchor: YearAnchor) -> Self {
        let (iso_year, week) = thursday_anchored_week(date);
        let year = match anchor {
            YearAnchor::Calendar => date.year(),
            YearAnchor::IsoWeekYear => iso_year,
        };
        Self { year, week }
    }

    /// Store key for this bucket: `PREFIX-YYYY-WW`.
    pub fn store_key(&self, prefix: &str) -> String {
        format!("{prefix}-{}-{:02}", self.year, self.week)
    }

    /// Folio prefix for this bucket: `PREFIX-YYYY-WW-`.
    pub fn folio_prefix(&self, prefix: &str) -> String {
        format!("{}-", self.store_key(prefix))
    }
}

impl Display for BucketKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.week)
    }
}

/// Returns the ISO-8601 week number of `date`, in `[1, 53]`.
pub fn week_number(date: NaiveDate) -> u32 {
    thursday_anchored_week(date).1
}

/// Returns the year of the Thursday that anchors the week containing `date`.
pub fn iso_week_year(date: NaiveDate) -> i32 {
    thursday_anchored_week(date).0
}

// Shifts to the Thursday of the Monday-start week, then counts 7-day periods
// from Jan 1 of that Thursday's year. Works on ordinals so it never leaves the
// representable date range.
fn thursday_anchored_week(date: NaiveDate) -> (i32, u32) {
    let weekday = date.weekday().number_from_monday() as i32;
    let mut year = date.year();
    let mut ordinal0 = date.ordinal0() as i32 + (4 - weekday);

    if ordinal0 < 0 {
        year -= 1;
        ordinal0 += days_in_year(year);
    } else if ordinal0 >= days_in_year(year) {
        ordinal0 -= days_in_year(year);
        year += 1;
    }

    (year, (ordinal0 / 7) as u32 + 1)
}

fn days_in_year(year: i32) -> i32 {
    if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
        366
    } else {
        365
    }
}
