use std::fmt;

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record for this date already exists.
    Duplicate(NaiveDate),
    /// Record rejected before reaching the database.
    Invalid(String),
    /// Stored row cannot be decoded.
    Corrupt(String),
    /// Database open / query / write error.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(date) => write!(f, "record for {date} already exists"),
            Self::Invalid(msg) => write!(f, "invalid record: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt row: {msg}"),
            Self::Backend(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}
