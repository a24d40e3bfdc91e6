//! Sales report decoding: gzip → UTF-8 → delimited rows keyed by header.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::MultiGzDecoder;

use crate::error::IngestError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One line of a sales report, cell text by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRow {
    fields: HashMap<String, String>,
}

impl ReportRow {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Cell text, `None` when the row is too short or the column unknown.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Decode a report body into rows.
///
/// Bodies without the gzip magic are read as plain text. Fails when the
/// body is not UTF-8, cannot be tokenized, or has no data rows.
pub fn decode_report(body: &[u8]) -> Result<Vec<ReportRow>, IngestError> {
    let raw = if body.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        MultiGzDecoder::new(body)
            .read_to_end(&mut out)
            .map_err(|e| IngestError::Parse(format!("gzip: {e}")))?;
        out
    } else {
        body.to_vec()
    };

    let text = String::from_utf8(raw).map_err(|e| IngestError::Parse(format!("utf-8: {e}")))?;
    parse_rows(text.trim_start_matches('\u{feff}'))
}

/// Parse delimited text with a header row.
///
/// Tab-delimited when the header line contains a tab, comma otherwise.
/// Short rows are tolerated; missing cells are simply absent.
pub fn parse_rows(text: &str) -> Result<Vec<ReportRow>, IngestError> {
    let header_line = text.lines().next().unwrap_or("");
    let tsv = header_line.contains('\t');

    // TSV reports are not quoted; titles may contain bare `"`.
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(if tsv { b'\t' } else { b',' })
        .quoting(!tsv)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| IngestError::Parse(format!("header row: {e}")))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(IngestError::Parse("report has no header row".into()));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| IngestError::Parse(format!("row {}: {e}", i + 1)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(ReportRow::from_pairs(headers.iter().zip(record.iter())));
    }

    if rows.is_empty() {
        return Err(IngestError::Parse("report has no data rows".into()));
    }
    Ok(rows)
}
