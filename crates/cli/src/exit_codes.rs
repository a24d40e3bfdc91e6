//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: cron jobs and scripts rely
//! on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                  |
//! |---------|-----------|----------------------------------------------|
//! | 0       | Universal | Success                                      |
//! | 1       | Universal | General error (unspecified)                  |
//! | 2       | Universal | CLI usage error (bad args, bad date)         |
//! | 3       | Universal | I/O error (settings file, output file)       |
//! | 50-59   | upstream  | App Store / Stripe requests and reports      |
//! | 60-69   | store     | Revenue store                                |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use revledger_config::ConfigError;
use revledger_ingest::IngestError;

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unparseable dates or periods.
pub const EXIT_USAGE: u8 = 2;

/// I/O error - settings file unreadable or invalid, output not writable.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Upstream (50-59)
// =============================================================================

/// Credentials missing or unusable (env var unset, bad private key).
pub const EXIT_NOT_AUTH: u8 = 50;

/// Upstream rejected our credentials (HTTP 401/403).
pub const EXIT_UPSTREAM_AUTH: u8 = 51;

/// Upstream rejected the request (HTTP 400).
pub const EXIT_UPSTREAM_VALIDATION: u8 = 52;

/// Rate limited (HTTP 429).
pub const EXIT_UPSTREAM_RATE_LIMIT: u8 = 53;

/// Any other non-2xx response, or a network failure / timeout.
pub const EXIT_UPSTREAM: u8 = 54;

/// Report body could not be decoded.
pub const EXIT_REPORT_PARSE: u8 = 55;

// =============================================================================
// Store (60-69)
// =============================================================================

/// Revenue store could not be opened or read.
pub const EXIT_STORE: u8 = 60;

/// Ingestion finished but at least one date failed to persist.
pub const EXIT_PARTIAL: u8 = 61;

/// Map an ingestion error to an exit code.
pub fn ingest_exit_code(err: &IngestError) -> u8 {
    match err {
        IngestError::Configuration(_) => EXIT_NOT_AUTH,
        IngestError::Upstream { status, .. } => match status {
            Some(401) | Some(403) => EXIT_UPSTREAM_AUTH,
            Some(400) => EXIT_UPSTREAM_VALIDATION,
            Some(429) => EXIT_UPSTREAM_RATE_LIMIT,
            _ => EXIT_UPSTREAM,
        },
        IngestError::Parse(_) => EXIT_REPORT_PARSE,
        IngestError::Persistence(_) => EXIT_STORE,
    }
}

/// Map a configuration error to an exit code.
pub fn config_exit_code(err: &ConfigError) -> u8 {
    match err {
        ConfigError::MissingCredentials(_) => EXIT_NOT_AUTH,
        ConfigError::Io(_) | ConfigError::Parse(_) | ConfigError::Validation(_) => EXIT_IO,
    }
}
