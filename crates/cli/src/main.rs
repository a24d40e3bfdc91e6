// revledger CLI - App Store + Stripe revenue ledger

mod common;
mod exit_codes;
mod feed;
mod ingest;
mod stripe;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use revledger_config::{ConfigError, Settings};
use revledger_ingest::IngestError;

use exit_codes::{EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "revledger")]
#[command(about = "Ingest App Store sales reports and Stripe charges into a daily revenue ledger")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: $REVLEDGER_CONFIG or <config dir>/revledger/settings.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite ledger file, overrides [store] path
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log debug detail
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest App Store sales for a day or a month into the ledger
    #[command(after_help = "\
Examples:
  revledger ingest                      # today minus report_lag_days
  revledger ingest --date 2024-08-17
  revledger ingest --month 2024-08 --json

Credentials (environment only):
  APP_STORE_KEY_ID, APP_STORE_ISSUER_ID, APP_STORE_VENDOR_NUMBER,
  APP_STORE_PRIVATE_KEY or APP_STORE_PRIVATE_KEY_PATH

Dates already in the ledger are skipped, so re-running is safe.

Exit codes:
  0   success (including dates already stored)
  50  credentials missing or unusable
  51  App Store rejected the token (401/403)
  52  App Store rejected the request (400)
  53  rate limited
  54  other upstream error, network failure, or no report (404)
  55  report could not be parsed
  60  ledger could not be opened
  61  some dates failed to persist")]
    Ingest {
        /// Report date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "month")]
        date: Option<String>,

        /// Whole month (YYYY-MM), one daily report per missing day
        #[arg(long)]
        month: Option<String>,

        /// Print the run as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ingest every day in an inclusive date range, one report per day
    #[command(after_help = "\
Examples:
  revledger backfill --from 2024-03-04 --to 2024-08-31
  revledger backfill --from 2024-08-01 --to 2024-08-07 --json

Days without a published report are reported and skipped; only store
failures (61) and rejected credentials (51) fail the run.")]
    Backfill {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Print the runs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch paid Stripe charges as a daily revenue series
    #[command(after_help = "\
Examples:
  revledger stripe --from 2024-03-04 --to 2024-08-31
  revledger stripe --from 2024-08-01 --to 2024-08-31 --out stripe.csv
  STRIPE_SECRET_KEY=sk_live_... revledger stripe --from 2024-08-01 --to 2024-08-01 --json

Output columns: date,amount_minor (net of refunds, UTC days).")]
    Stripe {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Stripe secret key (default: $STRIPE_SECRET_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Combined daily revenue from the ledger and Stripe, gap-filled
    #[command(after_help = "\
Examples:
  revledger feed --from 2024-08-01 --to 2024-08-31
  revledger feed --no-stripe --json

Output columns: date,app_store_minor,stripe_minor,cumulative_minor.
If Stripe is unreachable or no key is set, its column is zero.")]
    Feed {
        /// First day (default: [stripe] revenue_start)
        #[arg(long)]
        from: Option<String>,

        /// Last day, inclusive (default: today, UTC)
        #[arg(long)]
        to: Option<String>,

        /// Stripe secret key (default: $STRIPE_SECRET_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Ledger only, skip Stripe
        #[arg(long)]
        no_stripe: bool,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Show the effective settings
    Config {
        /// Print only the settings file path
        #[arg(long)]
        path: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Also installs the `log` bridge, so library records show up.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_settings(config: Option<PathBuf>, db: Option<PathBuf>) -> Result<(Settings, PathBuf), CliError> {
    let path = config.unwrap_or_else(Settings::config_path);
    let mut settings = Settings::load_from(&path)
        .map_err(|e| CliError::config(e).with_hint(format!("check {}", path.display())))?;
    if db.is_some() {
        settings.store.path = db;
    }
    Ok((settings, path))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result = load_settings(cli.config, cli.db).and_then(|(settings, path)| match cli.command {
        Commands::Ingest { date, month, json } => ingest::cmd_ingest(&settings, date, month, json),
        Commands::Backfill { from, to, json } => ingest::cmd_backfill(&settings, from, to, json),
        Commands::Stripe { from, to, api_key, out, json } => {
            stripe::cmd_stripe(&settings, from, to, api_key, out, json)
        }
        Commands::Feed { from, to, api_key, no_stripe, out, json } => {
            feed::cmd_feed(&settings, from, to, api_key, no_stripe, out, json)
        }
        Commands::Config { path: only_path } => cmd_config(&settings, &path, only_path),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        Self { code: exit_codes::config_exit_code(&err), message: err.to_string(), hint: None }
    }

    pub fn ingest(err: IngestError) -> Self {
        let hint = match &err {
            IngestError::Configuration(_) => {
                Some("set APP_STORE_KEY_ID, APP_STORE_ISSUER_ID, APP_STORE_VENDOR_NUMBER and APP_STORE_PRIVATE_KEY (or APP_STORE_PRIVATE_KEY_PATH)".to_string())
            }
            _ => None,
        };
        Self { code: exit_codes::ingest_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// config
// ============================================================================

fn cmd_config(settings: &Settings, path: &std::path::Path, only_path: bool) -> Result<(), CliError> {
    if only_path {
        println!("{}", path.display());
        return Ok(());
    }
    let text = toml::to_string_pretty(settings)
        .map_err(|e| CliError::io(format!("cannot render settings: {e}")))?;
    println!("# {}{}", path.display(), if path.exists() { "" } else { " (not found, defaults)" });
    println!("# ledger: {}", settings.store.effective_path().display());
    print!("{text}");
    Ok(())
}
