use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Number of months covered by the rolling reporting window, endpoints included.
pub const WINDOW_MONTHS: u32 = 6;

/// One (month, year) reporting unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    // Field order matters for the derived ordering: year first.
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Self {
        Self { year, month }
    }

    /// Two-digit month as the portal's selects expect it ("01".."12").
    pub fn month_value(&self) -> String {
        format!("{:02}", self.month)
    }

    pub fn year_value(&self) -> String {
        format!("{:04}", self.year)
    }

    /// The following month, rolling December over into January of the next year.
    pub fn next(&self) -> Self {
        if self.month >= 12 {
            Self::new(1, self.year + 1)
        } else {
            Self::new(self.month + 1, self.year)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}

/// Inclusive month range queried in every session of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub month_start: u32,
    pub year_start: i32,
    pub month_end: u32,
    pub year_end: i32,
}

impl PeriodWindow {
    pub fn start(&self) -> Period {
        Period::new(self.month_start, self.year_start)
    }

    pub fn end(&self) -> Period {
        Period::new(self.month_end, self.year_end)
    }
}

/// Window of six months ending at the month containing `today`.
pub fn compute_six_month_window(today: NaiveDate) -> PeriodWindow {
    let month_end = today.month();
    let year_end = today.year();

    let mut month_start = month_end as i32 - (WINDOW_MONTHS as i32 - 1);
    let mut year_start = year_end;
    if month_start <= 0 {
        month_start += 12;
        year_start -= 1;
    }

    PeriodWindow {
        month_start: month_start as u32,
        year_start,
        month_end,
        year_end,
    }
}

/// Every period from the window start to its end, both included.
///
/// An inverted window yields an empty sequence.
pub fn expand_window(window: &PeriodWindow) -> Vec<Period> {
    let end = window.end();
    let mut periods = Vec::new();
    let mut current = window.start();
    while current <= end {
        periods.push(current);
        current = current.next();
    }
    periods
}
