//! `revledger ingest` and `revledger backfill`.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use revledger_config::{AppStoreCredentials, Settings};
use revledger_core::dates::default_report_date;
use revledger_core::money::format_minor;
use revledger_core::ReportPeriod;
use revledger_ingest::{AppStorePipeline, DateOutcome, IngestError, IngestResult, Outcome, ReportOptions};
use revledger_store::SqliteRevenueStore;

use crate::common;
use crate::exit_codes;
use crate::CliError;

/// JSON shape of one ingestion run.
#[derive(Serialize)]
struct RunReport<'a> {
    period: String,
    inserted: usize,
    skipped_existing: usize,
    skipped_no_data: usize,
    failed: usize,
    inserted_total: String,
    degraded: Option<DegradedReport>,
    outcomes: &'a [DateOutcome],
}

#[derive(Serialize)]
struct DegradedReport {
    kind: &'static str,
    status: Option<u16>,
    message: String,
}

impl<'a> From<&'a IngestResult> for RunReport<'a> {
    fn from(r: &'a IngestResult) -> Self {
        Self {
            period: r.period.to_string(),
            inserted: r.inserted(),
            skipped_existing: r.skipped_existing(),
            skipped_no_data: r.skipped_no_data(),
            failed: r.failed(),
            inserted_total: format_minor(r.inserted_minor()),
            degraded: r.degraded.as_ref().map(|e| DegradedReport {
                kind: e.kind(),
                status: e.status(),
                message: e.to_string(),
            }),
            outcomes: &r.outcomes,
        }
    }
}

fn build_pipeline(
    settings: &Settings,
    store: SqliteRevenueStore,
) -> Result<AppStorePipeline<SqliteRevenueStore>, CliError> {
    let options = ReportOptions::from_settings(&settings.app_store, &settings.http);
    AppStorePipeline::new(store, AppStoreCredentials::from_env(), options).map_err(CliError::ingest)
}

fn resolve_period(
    settings: &Settings,
    date: Option<String>,
    month: Option<String>,
) -> Result<ReportPeriod, CliError> {
    match (date, month) {
        (Some(d), None) => Ok(ReportPeriod::day(common::parse_date("--date", &d)?)),
        (None, Some(m)) => {
            let period: ReportPeriod = m
                .parse()
                .map_err(|e| CliError::args(format!("invalid --month: {e}")))?;
            if !period.is_month() {
                return Err(CliError::args(format!("invalid --month {m:?}"))
                    .with_hint("use YYYY-MM, e.g. --month 2024-08"));
            }
            Ok(period)
        }
        (None, None) => Ok(ReportPeriod::day(default_report_date(
            Utc::now().date_naive(),
            settings.app_store.report_lag_days,
        ))),
        (Some(_), Some(_)) => Err(CliError::args("--date and --month are mutually exclusive")),
    }
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Inserted { amount_minor } => format!("inserted  {}", format_minor(*amount_minor)),
        Outcome::SkippedExisting => "skipped   already stored".to_string(),
        Outcome::SkippedNoData => "skipped   no data".to_string(),
        Outcome::Failed { reason } => format!("FAILED    {reason}"),
    }
}

fn print_summary(result: &IngestResult, verbose_dates: bool) {
    if verbose_dates {
        for o in &result.outcomes {
            println!("{}  {}", o.date, outcome_label(&o.outcome));
        }
    }
    println!(
        "{}: {} inserted ({}), {} already stored, {} without data, {} failed",
        result.period,
        result.inserted(),
        format_minor(result.inserted_minor()),
        result.skipped_existing(),
        result.skipped_no_data(),
        result.failed(),
    );
    if let Some(e) = &result.degraded {
        eprintln!("warning: {e}");
    }
}

/// Exit status for a single run: partial store failures first, then the
/// degradation cause.
fn run_status(result: &IngestResult) -> Result<(), CliError> {
    if result.failed() > 0 {
        return Err(CliError {
            code: exit_codes::EXIT_PARTIAL,
            message: format!("{} of {} dates failed to persist", result.failed(), result.outcomes.len()),
            hint: None,
        });
    }
    match &result.degraded {
        Some(e) => Err(CliError {
            code: exit_codes::ingest_exit_code(e),
            message: String::new(),
            hint: degraded_hint(e),
        }),
        None => Ok(()),
    }
}

fn degraded_hint(e: &IngestError) -> Option<String> {
    match e.status() {
        Some(401) | Some(403) => Some("check APP_STORE_KEY_ID, APP_STORE_ISSUER_ID and the private key".into()),
        Some(404) => Some("the report may not be published yet; daily reports lag by a day or two".into()),
        _ => None,
    }
}

pub(crate) fn cmd_ingest(
    settings: &Settings,
    date: Option<String>,
    month: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let period = resolve_period(settings, date, month)?;
    let store = common::open_store(&settings.store.effective_path())?;
    let pipeline = build_pipeline(settings, store)?;

    log::info!("ingesting App Store sales for {period}");
    let result = pipeline.ingest_period(period).map_err(CliError::ingest)?;

    if json {
        common::write_json(&RunReport::from(&result), &None)?;
        if let Some(e) = &result.degraded {
            eprintln!("warning: {e}");
        }
    } else {
        print_summary(&result, true);
    }
    run_status(&result)
}

pub(crate) fn cmd_backfill(
    settings: &Settings,
    from: String,
    to: String,
    json: bool,
) -> Result<(), CliError> {
    let (from_date, to_date) = common::parse_date_range(&from, &to)?;
    let store = common::open_store(&settings.store.effective_path())?;
    let pipeline = build_pipeline(settings, store)?;

    log::info!("backfilling App Store sales {from_date}..={to_date}");
    let results = pipeline.backfill(from_date, to_date).map_err(CliError::ingest)?;

    if json {
        let reports: Vec<RunReport<'_>> = results.iter().map(RunReport::from).collect();
        common::write_json(&reports, &None)?;
    } else {
        for r in &results {
            for o in &r.outcomes {
                println!("{}  {}", o.date, outcome_label(&o.outcome));
            }
        }
        print_backfill_totals(&results, from_date, to_date);
    }
    backfill_status(&results)
}

fn print_backfill_totals(results: &[IngestResult], from: NaiveDate, to: NaiveDate) {
    let sum = |f: fn(&IngestResult) -> usize| results.iter().map(f).sum::<usize>();
    let total: i64 = results.iter().map(IngestResult::inserted_minor).sum();
    println!(
        "{from}..={to}: {} inserted ({}), {} already stored, {} without data, {} failed",
        sum(IngestResult::inserted),
        format_minor(total),
        sum(IngestResult::skipped_existing),
        sum(IngestResult::skipped_no_data),
        sum(IngestResult::failed),
    );
}

/// Days without a report are normal in a backfill, so only store failures
/// and rejected credentials fail the run.
fn backfill_status(results: &[IngestResult]) -> Result<(), CliError> {
    let failed: usize = results.iter().map(IngestResult::failed).sum();
    if failed > 0 {
        return Err(CliError {
            code: exit_codes::EXIT_PARTIAL,
            message: format!("{failed} dates failed to persist"),
            hint: Some("re-run the same range; stored dates are skipped".into()),
        });
    }
    let auth = results
        .iter()
        .filter_map(|r| r.degraded.as_ref())
        .find(|e| matches!(e.status(), Some(401) | Some(403)));
    if let Some(e) = auth {
        return Err(CliError {
            code: exit_codes::EXIT_UPSTREAM_AUTH,
            message: e.to_string(),
            hint: degraded_hint(e),
        });
    }
    Ok(())
}
