// SQLite-backed revenue store

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use revledger_core::DailyRevenueRecord;

use crate::{RevenueStore, StoreError};

// `report_date` is UNIQUE so a second writer racing past the existence
// check gets a constraint error instead of a duplicate row.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS app_store_sales_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    report_date TEXT NOT NULL UNIQUE,          -- YYYY-MM-DD
    proceeds_minor INTEGER NOT NULL CHECK (proceeds_minor >= 0)
);
"#;

const DATE_FMT: &str = "%Y-%m-%d";

pub struct SqliteRevenueStore {
    conn: Connection,
}

impl SqliteRevenueStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        log::debug!("opened revenue store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM app_store_sales_history", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<(String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_record((date, proceeds, created): (String, i64, String)) -> Result<DailyRevenueRecord, StoreError> {
    let report_date = NaiveDate::parse_from_str(&date, DATE_FMT)
        .map_err(|e| StoreError::Corrupt(format!("report_date {date:?}: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created)
        .map_err(|e| StoreError::Corrupt(format!("created_at {created:?}: {e}")))?
        .with_timezone(&Utc);
    DailyRevenueRecord::new(report_date, proceeds, created_at)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl RevenueStore for SqliteRevenueStore {
    fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRevenueRecord>, StoreError> {
        let key = date.format(DATE_FMT).to_string();
        let row = self
            .conn
            .query_row(
                "SELECT report_date, proceeds_minor, created_at
                 FROM app_store_sales_history WHERE report_date = ?1",
                params![key],
                decode_row,
            )
            .optional()?;
        row.map(to_record).transpose()
    }

    fn list_ascending(&self) -> Result<Vec<DailyRevenueRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT report_date, proceeds_minor, created_at
             FROM app_store_sales_history ORDER BY report_date ASC",
        )?;
        let rows = stmt.query_map([], decode_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(to_record(row?)?);
        }
        Ok(records)
    }

    fn insert(&self, date: NaiveDate, proceeds_minor: i64) -> Result<DailyRevenueRecord, StoreError> {
        if proceeds_minor < 0 {
            return Err(StoreError::Invalid(format!(
                "negative proceeds {proceeds_minor} for {date}"
            )));
        }
        // Millisecond precision is what the column holds, so the returned
        // record equals the stored one.
        let created_at = Utc::now().trunc_subsecs(3);
        let record = DailyRevenueRecord::new(date, proceeds_minor, created_at)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        match self.conn.execute(
            "INSERT INTO app_store_sales_history (report_date, proceeds_minor, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                date.format(DATE_FMT).to_string(),
                proceeds_minor,
                created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        ) {
            Ok(_) => Ok(record),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(date)),
            Err(e) => Err(e.into()),
        }
    }
}
