//! Shared helpers for revledger subcommands.
//!
//! - `parse_date` / `parse_date_range` - validate `--date`, `--from`, `--to`
//! - `open_store` - open the SQLite ledger at the configured path
//! - `write_csv` / `write_json` - emit results to a file or stdout

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use revledger_store::SqliteRevenueStore;

use crate::exit_codes;
use crate::CliError;

/// Parse a `YYYY-MM-DD` flag value.
pub(crate) fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::args(format!("invalid {flag} date {value:?}: {e}")))
}

/// Parse and validate an inclusive `--from` / `--to` range.
pub(crate) fn parse_date_range(from: &str, to: &str) -> Result<(NaiveDate, NaiveDate), CliError> {
    let from_date = parse_date("--from", from)?;
    let to_date = parse_date("--to", to)?;

    if from_date > to_date {
        return Err(CliError::args(format!(
            "--from ({from_date}) must not be after --to ({to_date})"
        )));
    }
    Ok((from_date, to_date))
}

pub(crate) fn open_store(path: &Path) -> Result<SqliteRevenueStore, CliError> {
    SqliteRevenueStore::open(path).map_err(|e| CliError {
        code: exit_codes::EXIT_STORE,
        message: format!("cannot open store {}: {}", path.display(), e),
        hint: Some("set [store] path in settings.toml or pass --db".into()),
    })
}

fn open_output(out: &Option<PathBuf>) -> Result<Box<dyn Write>, CliError> {
    Ok(match out {
        Some(path) => {
            let f = std::fs::File::create(path)
                .map_err(|e| CliError::io(format!("cannot create {}: {}", path.display(), e)))?;
            Box::new(std::io::BufWriter::new(f))
        }
        None => Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
    })
}

/// Write rows as CSV (file or stdout). The header is written even when
/// there are no rows. Returns the output label for progress messages.
pub(crate) fn write_csv<T: Serialize>(
    header: &[&str],
    rows: &[T],
    out: &Option<PathBuf>,
) -> Result<String, CliError> {
    let out_label = out
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(open_output(out)?);

    csv_writer
        .write_record(header)
        .map_err(|e| CliError::io(format!("CSV write error: {e}")))?;
    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| CliError::io(format!("CSV write error: {e}")))?;
    }
    csv_writer
        .flush()
        .map_err(|e| CliError::io(format!("CSV flush error: {e}")))?;

    Ok(out_label)
}

/// Pretty-print a value as JSON (file or stdout).
pub(crate) fn write_json<T: Serialize + ?Sized>(value: &T, out: &Option<PathBuf>) -> Result<(), CliError> {
    let mut w = open_output(out)?;
    serde_json::to_writer_pretty(&mut w, value).map_err(|e| CliError {
        code: exit_codes::EXIT_ERROR,
        message: format!("JSON encode error: {e}"),
        hint: None,
    })?;
    writeln!(w).and_then(|_| w.flush()).map_err(|e| CliError::io(format!("write error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        date: String,
        amount_minor: i64,
    }

    #[test]
    fn test_parse_date_range_valid() {
        let (from, to) = parse_date_range("2024-08-01", "2024-08-31").unwrap();
        assert_eq!(from.to_string(), "2024-08-01");
        assert_eq!(to.to_string(), "2024-08-31");
    }

    #[test]
    fn test_parse_date_range_single_day() {
        let (from, to) = parse_date_range("2024-08-01", "2024-08-01").unwrap();
        assert_eq!(from, to);
    }

    #[test]
    fn test_parse_date_range_invalid_order() {
        let err = parse_date_range("2024-08-31", "2024-08-01").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
        assert!(err.message.contains("--from"));
    }

    #[test]
    fn test_parse_date_bad_format() {
        let err = parse_date("--date", "08/01/2024").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
        assert!(err.message.contains("invalid --date date"));
    }

    #[test]
    fn test_write_csv_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            Row { date: "2024-08-01".into(), amount_minor: 350 },
            Row { date: "2024-08-02".into(), amount_minor: 99 },
        ];
        let label = write_csv(&["date", "amount_minor"], &rows, &Some(path.clone())).unwrap();
        assert_eq!(label, path.display().to_string());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "date,amount_minor\n2024-08-01,350\n2024-08-02,99\n");
    }

    #[test]
    fn test_write_csv_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let rows: Vec<Row> = Vec::new();
        write_csv(&["date", "amount_minor"], &rows, &Some(path.clone())).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "date,amount_minor\n");
    }

    #[test]
    fn test_open_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("ledger.sqlite3");
        open_store(&path).unwrap();
        assert!(path.exists());
    }
}
