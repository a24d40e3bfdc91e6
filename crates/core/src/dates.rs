//! Report-date helpers.

use chrono::{Days, NaiveDate};

/// Parse a report cell date. The App Store writes `MM/DD/YYYY`; ISO
/// `YYYY-MM-DD` is accepted as well. Returns `None` for blank or
/// malformed input so the caller can drop the row.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Every calendar day in `[from, to]`. Empty when `from > to`.
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// The most recent day the App Store is expected to have published a daily
/// report for. Daily reports lag by a day or two.
pub fn default_report_date(today: NaiveDate, lag_days: u32) -> NaiveDate {
    today.checked_sub_days(Days::new(lag_days as u64)).unwrap_or(today)
}
