//! `revledger-store`: where daily App Store proceeds live.
//!
//! The pipeline only needs three operations: point lookup by date, ordered
//! scan, and insert. No update, no delete.

mod error;
mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteRevenueStore;

use chrono::NaiveDate;
use revledger_core::DailyRevenueRecord;

/// Append-only table of one record per report date.
pub trait RevenueStore {
    /// The record for exactly `date`, if any.
    fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRevenueRecord>, StoreError>;

    /// Every record, `report_date` ascending.
    fn list_ascending(&self) -> Result<Vec<DailyRevenueRecord>, StoreError>;

    /// Insert a new record. `created_at` is assigned by the store.
    ///
    /// Returns [`StoreError::Duplicate`] when `date` is already present.
    fn insert(&self, date: NaiveDate, proceeds_minor: i64)
        -> Result<DailyRevenueRecord, StoreError>;
}

impl<S: RevenueStore + ?Sized> RevenueStore for &S {
    fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRevenueRecord>, StoreError> {
        (**self).find_by_date(date)
    }

    fn list_ascending(&self) -> Result<Vec<DailyRevenueRecord>, StoreError> {
        (**self).list_ascending()
    }

    fn insert(&self, date: NaiveDate, proceeds_minor: i64) -> Result<DailyRevenueRecord, StoreError> {
        (**self).insert(date, proceeds_minor)
    }
}
