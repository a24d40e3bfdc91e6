use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::Serialize;

use crate::dates::days_inclusive;

/// The span one ingestion run covers: a single day, or every day of a
/// calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportPeriod {
    Day { date: NaiveDate },
    Month { year: i32, month: u32 },
}

impl ReportPeriod {
    pub fn day(date: NaiveDate) -> Self {
        Self::Day { date }
    }

    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(PeriodError::InvalidMonth { year, month });
        }
        Ok(Self::Month { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        match *self {
            Self::Day { date } => date,
            Self::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1)
                .unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        match *self {
            Self::Day { date } => date,
            Self::Month { .. } => {
                let first = self.first_day();
                first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(first)
            }
        }
    }

    /// Every date this period can produce a record for.
    pub fn candidate_dates(&self) -> Vec<NaiveDate> {
        days_inclusive(self.first_day(), self.last_day())
    }

    pub fn is_month(&self) -> bool {
        matches!(self, Self::Month { .. })
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day { date } => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl FromStr for ReportPeriod {
    type Err = PeriodError;

    /// `YYYY-MM-DD` is a day, `YYYY-MM` a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::day(date));
        }
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| PeriodError::Unparseable(s.to_string()))?;
        if y.len() != 4 || m.len() != 2 {
            return Err(PeriodError::Unparseable(s.to_string()));
        }
        let year: i32 = y.parse().map_err(|_| PeriodError::Unparseable(s.to_string()))?;
        let month: u32 = m.parse().map_err(|_| PeriodError::Unparseable(s.to_string()))?;
        Self::month(year, month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    Unparseable(String),
    InvalidMonth { year: i32, month: u32 },
}

impl fmt::Display for PeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable(s) => {
                write!(f, "cannot parse period {s:?} (expected YYYY-MM-DD or YYYY-MM)")
            }
            Self::InvalidMonth { year, month } => write!(f, "invalid month {year}-{month}"),
        }
    }
}

impl std::error::Error for PeriodError {}
