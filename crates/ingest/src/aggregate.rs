use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use revledger_core::dates::parse_report_date;
use revledger_core::money::{micros_to_minor, parse_decimal_micros};

use crate::report::ReportRow;

/// Per-day proceeds plus counts of the rows that needed special handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyTotals {
    /// Minor units per date, rounded once per day.
    pub totals: BTreeMap<NaiveDate, i64>,
    /// Rows without a usable date, excluded from every bucket.
    pub dropped_rows: usize,
    /// Rows whose proceeds cell was missing or non-numeric, counted as zero.
    pub zeroed_rows: usize,
    /// Dates whose sum left the i64 micro-unit range. Absent from `totals`.
    pub overflowed: BTreeSet<NaiveDate>,
}

/// Group rows by the date in `date_column` and sum `proceeds_column`.
pub fn aggregate_proceeds(rows: &[ReportRow], date_column: &str, proceeds_column: &str) -> DailyTotals {
    let mut micros: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut dropped_rows = 0;
    let mut zeroed_rows = 0;
    let mut overflowed = BTreeSet::new();

    for row in rows {
        let Some(date) = row.get(date_column).and_then(parse_report_date) else {
            dropped_rows += 1;
            continue;
        };
        let amount = match row.get(proceeds_column).and_then(parse_decimal_micros) {
            Some(v) => v,
            None => {
                zeroed_rows += 1;
                0
            }
        };
        if overflowed.contains(&date) {
            continue;
        }
        let entry = micros.entry(date).or_insert(0);
        match entry.checked_add(amount) {
            Some(sum) => *entry = sum,
            None => {
                micros.remove(&date);
                overflowed.insert(date);
            }
        }
    }

    if dropped_rows > 0 {
        log::debug!("dropped {dropped_rows} report rows without a valid {date_column:?}");
    }
    if zeroed_rows > 0 {
        log::debug!("{zeroed_rows} report rows had non-numeric {proceeds_column:?}, counted as 0");
    }
    for date in &overflowed {
        log::warn!("proceeds for {date} overflow, day excluded");
    }

    DailyTotals {
        totals: micros.into_iter().map(|(d, m)| (d, micros_to_minor(m))).collect(),
        dropped_rows,
        zeroed_rows,
        overflowed,
    }
}
