use std::fmt;

use revledger_config::ConfigError;
use revledger_store::StoreError;

/// Failure classes of an ingestion run.
///
/// Only `Configuration` is returned as `Err` from the pipeline. The other
/// three are scoped to a period or a single date and end up inside the
/// `IngestResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Credentials missing or unusable. Nothing was sent upstream.
    Configuration(String),
    /// Non-2xx response or transport failure. `status` is `None` for
    /// network errors and timeouts.
    Upstream { status: Option<u16>, message: String },
    /// Report body could not be decoded into rows.
    Parse(String),
    /// Store read or write failed.
    Persistence(String),
}

impl IngestError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream { status, message: message.into() }
    }

    /// HTTP status for upstream errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Stable lowercase tag, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Upstream { .. } => "upstream",
            Self::Parse(_) => "parse",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Upstream { status: Some(code), message } => {
                write!(f, "upstream error (HTTP {code}): {message}")
            }
            Self::Upstream { status: None, message } => write!(f, "upstream error: {message}"),
            Self::Parse(msg) => write!(f, "report parse error: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence error: {msg}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<ConfigError> for IngestError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e.to_string())
    }
}
