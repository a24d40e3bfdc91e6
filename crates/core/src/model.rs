use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::format_minor;

/// One stored day of App Store proceeds.
///
/// `created_at` is assigned by the store on insert. Records are never
/// updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenueRecord {
    pub report_date: NaiveDate,
    /// Proceeds in minor units (cents). Never negative.
    pub proceeds_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl DailyRevenueRecord {
    pub fn new(
        report_date: NaiveDate,
        proceeds_minor: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if proceeds_minor < 0 {
            return Err(RecordError::NegativeAmount {
                date: report_date,
                amount_minor: proceeds_minor,
            });
        }
        Ok(Self { report_date, proceeds_minor, created_at })
    }

    pub fn point(&self) -> RevenuePoint {
        RevenuePoint { date: self.report_date, amount_minor: self.proceeds_minor }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    NegativeAmount { date: NaiveDate, amount_minor: i64 },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeAmount { date, amount_minor } => write!(
                f,
                "proceeds for {date} would be negative ({})",
                format_minor(*amount_minor)
            ),
        }
    }
}

impl std::error::Error for RecordError {}

/// One day of one source's revenue series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub date: NaiveDate,
    pub amount_minor: i64,
}

/// One gap-filled day of the combined revenue feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartRow {
    pub date: NaiveDate,
    pub app_store_minor: i64,
    pub stripe_minor: i64,
    /// Running total of both sources up to and including `date`.
    pub cumulative_minor: i64,
}

impl ChartRow {
    pub fn day_total(&self) -> i64 {
        self.app_store_minor + self.stripe_minor
    }
}
