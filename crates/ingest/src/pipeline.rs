//! App Store sales-report ingestion.
//!
//! One run covers one [`ReportPeriod`]:
//!
//! 1. require credentials and mint a token (fails fast, nothing sent)
//! 2. skip dates already in the store
//! 3. fetch the daily report for each remaining date
//! 4. gunzip and parse it
//! 5. sum the proceeds attributed to that date
//! 6. insert the day, re-checking the store first
//!
//! A month is one daily request per missing day, never a monthly report,
//! so each stored amount belongs to exactly one day. Upstream and parse
//! failures degrade the affected day to "no data"; a rejected token
//! degrades the rest of the period. Store failures are scoped to the date
//! they hit. There is no internal retry: re-running a period is safe
//! because present dates are skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use revledger_config::settings::{AppStoreSettings, HttpSettings};
use revledger_config::{AppStoreCredentials, DateColumn};
use revledger_core::dates::days_inclusive;
use revledger_core::money::format_minor;
use revledger_core::ReportPeriod;
use revledger_store::{RevenueStore, StoreError};

use crate::aggregate::aggregate_proceeds;
use crate::cache::{Clock, SystemClock};
use crate::client::FetchClient;
use crate::error::IngestError;
use crate::report::decode_report;
use crate::token::mint_token;

/// What happened to one candidate date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Inserted { amount_minor: i64 },
    SkippedExisting,
    SkippedNoData,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateOutcome {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    pub period: ReportPeriod,
    /// One entry per candidate date, ascending.
    pub outcomes: Vec<DateOutcome>,
    /// First fetch or parse failure of the run, if any.
    pub degraded: Option<IngestError>,
}

impl IngestResult {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Inserted { .. }))
    }

    pub fn skipped_existing(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SkippedExisting))
    }

    pub fn skipped_no_data(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SkippedNoData))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn outcome_for(&self, date: NaiveDate) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.date == date).map(|o| &o.outcome)
    }

    /// Sum of all inserted amounts.
    pub fn inserted_minor(&self) -> i64 {
        self.outcomes
            .iter()
            .filter_map(|o| match o.outcome {
                Outcome::Inserted { amount_minor } => Some(amount_minor),
                _ => None,
            })
            .sum()
    }
}

/// Report request knobs, usually taken from [`AppStoreSettings`].
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub api_base: String,
    pub report_version: String,
    pub date_column: DateColumn,
    pub proceeds_column: String,
    pub token_ttl_secs: u64,
    pub timeout: Duration,
}

impl ReportOptions {
    pub fn from_settings(app_store: &AppStoreSettings, http: &HttpSettings) -> Self {
        Self {
            api_base: app_store.api_base.clone(),
            report_version: app_store.report_version.clone(),
            date_column: app_store.date_column,
            proceeds_column: app_store.proceeds_column.clone(),
            token_ttl_secs: app_store.token_ttl_secs,
            timeout: Duration::from_secs(http.timeout_secs),
        }
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::from_settings(&AppStoreSettings::default(), &HttpSettings::default())
    }
}

pub struct AppStorePipeline<S, C = SystemClock> {
    store: S,
    credentials: AppStoreCredentials,
    options: ReportOptions,
    client: FetchClient,
    clock: C,
}

impl<S: RevenueStore> AppStorePipeline<S, SystemClock> {
    pub fn new(
        store: S,
        credentials: AppStoreCredentials,
        options: ReportOptions,
    ) -> Result<Self, IngestError> {
        Self::with_clock(store, credentials, options, SystemClock)
    }
}

impl<S: RevenueStore, C: Clock> AppStorePipeline<S, C> {
    pub fn with_clock(
        store: S,
        credentials: AppStoreCredentials,
        options: ReportOptions,
        clock: C,
    ) -> Result<Self, IngestError> {
        let client = FetchClient::new("App Store", extract_app_store_error, options.timeout)?;
        Ok(Self { store, credentials, options, client, clock })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest every candidate date of `period`.
    ///
    /// Returns `Err` only for configuration problems, before any store or
    /// network access. Everything else is reported per date.
    pub fn ingest_period(&self, period: ReportPeriod) -> Result<IngestResult, IngestError> {
        let creds = self.credentials.require()?;
        let token = mint_token(&creds, self.clock.now(), self.options.token_ttl_secs)?;

        let mut outcomes: BTreeMap<NaiveDate, Outcome> = BTreeMap::new();
        let mut pending = Vec::new();
        for date in period.candidate_dates() {
            match self.store.find_by_date(date) {
                Ok(Some(_)) => {
                    outcomes.insert(date, Outcome::SkippedExisting);
                }
                Ok(None) => pending.push(date),
                Err(e) => {
                    log::error!("existence check for {date} failed: {e}");
                    outcomes.insert(date, Outcome::Failed { reason: e.to_string() });
                }
            }
        }

        if pending.is_empty() {
            log::info!("{period}: no date left to fetch");
            return Ok(finish(period, outcomes, None));
        }

        let mut degraded = None;
        let mut pending = pending.into_iter();
        while let Some(date) = pending.next() {
            let outcome = match self.fetch_day(date, &token, &creds.vendor_number) {
                Ok(total) => total.map_or(Outcome::SkippedNoData, |t| self.persist(date, t)),
                Err(e) => {
                    log::warn!("{date}: no data ingested: {e}");
                    let rejected = matches!(e.status(), Some(401) | Some(403));
                    if degraded.is_none() {
                        degraded = Some(e);
                    }
                    outcomes.insert(date, Outcome::SkippedNoData);
                    if rejected {
                        // Same token for every day; the rest would be rejected too.
                        for rest in pending.by_ref() {
                            outcomes.insert(rest, Outcome::SkippedNoData);
                        }
                    }
                    continue;
                }
            };
            outcomes.insert(date, outcome);
        }

        Ok(finish(period, outcomes, degraded))
    }

    /// Fetch and sum the daily report for `date`. `Ok(None)` when the
    /// report has no rows attributed to that day.
    fn fetch_day(
        &self,
        date: NaiveDate,
        token: &str,
        vendor_number: &str,
    ) -> Result<Option<i64>, IngestError> {
        let rows = decode_report(&self.fetch_report(date, token, vendor_number)?)?;
        let agg = aggregate_proceeds(
            &rows,
            self.options.date_column.header(),
            &self.options.proceeds_column,
        );
        log::info!(
            "{date}: {} report rows, {} dated buckets, {} rows dropped",
            rows.len(),
            agg.totals.len(),
            agg.dropped_rows,
        );
        for other in agg.totals.keys().filter(|d| **d != date) {
            log::debug!("{date}: ignoring report rows dated {other}");
        }
        if agg.overflowed.contains(&date) {
            return Err(IngestError::Parse(format!(
                "proceeds for {date} exceed the representable range"
            )));
        }
        Ok(agg.totals.get(&date).copied())
    }

    /// Ingest each day of `[from, to]` in order, one run per day.
    ///
    /// A configuration error stops the backfill; anything else is
    /// recorded in that day's result and the loop moves on.
    pub fn backfill(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IngestResult>, IngestError> {
        let mut results = Vec::new();
        for date in days_inclusive(from, to) {
            results.push(self.ingest_period(ReportPeriod::day(date))?);
        }
        Ok(results)
    }

    fn persist(&self, date: NaiveDate, total: i64) -> Outcome {
        // Another writer may have stored this date while we were fetching.
        match self.store.find_by_date(date) {
            Ok(Some(_)) => return Outcome::SkippedExisting,
            Ok(None) => {}
            Err(e) => {
                log::error!("re-check for {date} failed: {e}");
                return Outcome::Failed { reason: e.to_string() };
            }
        }

        if total < 0 {
            let reason = format!("proceeds for {date} are negative ({})", format_minor(total));
            log::error!("{reason}, not stored");
            return Outcome::Failed { reason };
        }

        match self.store.insert(date, total) {
            Ok(record) => {
                log::info!("stored {date}: {}", format_minor(record.proceeds_minor));
                Outcome::Inserted { amount_minor: record.proceeds_minor }
            }
            Err(StoreError::Duplicate(_)) => {
                log::info!("{date} was stored concurrently, skipping");
                Outcome::SkippedExisting
            }
            Err(e) => {
                log::error!("insert for {date} failed: {e}");
                Outcome::Failed { reason: IngestError::from(e).to_string() }
            }
        }
    }

    fn fetch_report(
        &self,
        date: NaiveDate,
        token: &str,
        vendor_number: &str,
    ) -> Result<Vec<u8>, IngestError> {
        let url = format!("{}/v1/salesReports", self.options.api_base.trim_end_matches('/'));
        let params = [
            ("filter[frequency]", "DAILY".to_string()),
            ("filter[reportSubType]", "SUMMARY".to_string()),
            ("filter[reportType]", "SALES".to_string()),
            ("filter[vendorNumber]", vendor_number.to_string()),
            ("filter[reportDate]", date.format("%Y-%m-%d").to_string()),
            ("filter[version]", self.options.report_version.clone()),
        ];

        log::debug!("GET {url} (DAILY {date})");
        self.client.get_bytes(|http| {
            http.get(&url)
                .bearer_auth(token)
                .header(reqwest::header::ACCEPT, "application/a-gzip")
                .query(&params)
        })
    }
}

fn finish(
    period: ReportPeriod,
    outcomes: BTreeMap<NaiveDate, Outcome>,
    degraded: Option<IngestError>,
) -> IngestResult {
    IngestResult {
        period,
        outcomes: outcomes
            .into_iter()
            .map(|(date, outcome)| DateOutcome { date, outcome })
            .collect(),
        degraded,
    }
}

fn extract_app_store_error(body: &serde_json::Value, status: u16) -> String {
    let first = &body["errors"][0];
    first["detail"]
        .as_str()
        .or_else(|| first["title"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::io::Write;

    use chrono::{TimeZone, Utc};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use httpmock::prelude::*;

    use revledger_config::credentials::{
        ISSUER_ID_ENV, KEY_ID_ENV, PRIVATE_KEY_ENV, VENDOR_NUMBER_ENV,
    };
    use revledger_core::DailyRevenueRecord;
    use revledger_store::SqliteRevenueStore;

    use crate::cache::ManualClock;

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/AuthKey_TEST.p8");

    const HEADER: &str = "Provider\tSKU\tTitle\tUnits\tDeveloper Proceeds\tBegin Date\tEnd Date\tCurrency of Proceeds";

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn creds() -> AppStoreCredentials {
        AppStoreCredentials {
            key_id: Some("2X9R4HXF34".into()),
            issuer_id: Some("57246542-96fe-1a63-e053-0824d011072a".into()),
            private_key: Some(PRIVATE_KEY.into()),
            vendor_number: Some("85012345".into()),
        }
    }

    fn options(server: &MockServer) -> ReportOptions {
        ReportOptions {
            api_base: server.base_url(),
            timeout: Duration::from_secs(5),
            ..ReportOptions::default()
        }
    }

    fn tsv(rows: &[(&str, &str)]) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for (date, proceeds) in rows {
            out.push_str(&format!("APPLE\tcom.example.pro\tPro\t1\t{proceeds}\t{date}\t{date}\tUSD\n"));
        }
        out
    }

    fn gzip(s: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(s.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    fn mock_report<'a>(server: &'a MockServer, report_date: &str, body: Vec<u8>) -> httpmock::Mock<'a> {
        let report_date = report_date.to_string();
        server.mock(move |when, then| {
            when.method(GET)
                .path("/v1/salesReports")
                .query_param("filter[reportDate]", report_date.as_str())
                .header("accept", "application/a-gzip")
                .header_exists("authorization");
            then.status(200)
                .header("content-type", "application/a-gzip")
                .body(body);
        })
    }

    fn pipeline(server: &MockServer) -> AppStorePipeline<SqliteRevenueStore> {
        AppStorePipeline::new(SqliteRevenueStore::open_in_memory().unwrap(), creds(), options(server))
            .unwrap()
    }

    // ── Request shape ───────────────────────────────────────────────

    #[test]
    fn daily_request_carries_filters_and_bearer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/salesReports")
                .query_param("filter[frequency]", "DAILY")
                .query_param("filter[reportSubType]", "SUMMARY")
                .query_param("filter[reportType]", "SALES")
                .query_param("filter[vendorNumber]", "85012345")
                .query_param("filter[reportDate]", "2024-08-01")
                .query_param("filter[version]", "1_0")
                .header("accept", "application/a-gzip")
                .header_exists("authorization");
            then.status(200).body(gzip(&tsv(&[("08/01/2024", "1.00")])));
        });

        let result = pipeline(&server).ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        mock.assert();
        assert_eq!(result.inserted(), 1);
    }

    #[test]
    fn month_is_fetched_day_by_day_without_double_counting() {
        let server = MockServer::start();
        let monthly = server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports").query_param("filter[frequency]", "MONTHLY");
            then.status(200).body(gzip(&format!(
                "{HEADER}\nAPPLE\tsku\tPro\t3\t12.00\t08/01/2024\t08/31/2024\tUSD\n"
            )));
        });
        let daily = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/salesReports")
                .query_param("filter[frequency]", "DAILY")
                .query_param_exists("filter[reportDate]");
            then.status(200).body(gzip(&tsv(&[("08/05/2024", "4.00")])));
        });
        let p = pipeline(&server);

        let month = p.ingest_period(ReportPeriod::month(2024, 8).unwrap()).unwrap();
        assert_eq!(month.outcomes.len(), 31);
        assert_eq!(month.inserted(), 1);
        assert_eq!(month.outcome_for(d("2024-08-05")), Some(&Outcome::Inserted { amount_minor: 400 }));
        assert_eq!(month.outcome_for(d("2024-08-01")), Some(&Outcome::SkippedNoData));
        assert!(month.degraded.is_none());

        let day = p.ingest_period(ReportPeriod::day(d("2024-08-05"))).unwrap();
        assert_eq!(day.outcome_for(d("2024-08-05")), Some(&Outcome::SkippedExisting));

        let total: i64 = p.store().list_ascending().unwrap().iter().map(|r| r.proceeds_minor).sum();
        assert_eq!(total, 400);
        monthly.assert_calls(0);
        daily.assert_calls(31);
    }

    // ── Idempotence ─────────────────────────────────────────────────

    #[test]
    fn second_run_skips_existing_date() {
        let server = MockServer::start();
        let mock = mock_report(&server, "2024-08-01", gzip(&tsv(&[("08/01/2024", "3.50")])));
        let p = pipeline(&server);

        let first = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(first.outcome_for(d("2024-08-01")), Some(&Outcome::Inserted { amount_minor: 350 }));

        let second = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(second.outcome_for(d("2024-08-01")), Some(&Outcome::SkippedExisting));
        assert_eq!(p.store().count().unwrap(), 1);
        // The fast path does not fetch again.
        mock.assert_calls(1);
    }

    #[test]
    fn month_run_only_fills_missing_days() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(200).body(gzip(&tsv(&[
                ("08/01/2024", "1.00"),
                ("08/02/2024", "2.00"),
                ("08/03/2024", "3.00"),
            ])));
        });
        let p = pipeline(&server);
        p.store().insert(d("2024-08-02"), 999).unwrap();

        let result = p.ingest_period(ReportPeriod::month(2024, 8).unwrap()).unwrap();
        assert_eq!(result.inserted(), 2);
        assert_eq!(result.outcome_for(d("2024-08-02")), Some(&Outcome::SkippedExisting));
        // Existing record untouched.
        assert_eq!(p.store().find_by_date(d("2024-08-02")).unwrap().unwrap().proceeds_minor, 999);
    }

    // ── Aggregation through the pipeline ────────────────────────────

    #[test]
    fn report_rows_are_summed_per_day() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(200).body(gzip(&tsv(&[
                ("08/01/2024", "1.00"),
                ("08/01/2024", "2.50"),
                ("08/02/2024", "0.99"),
            ])));
        });
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::month(2024, 8).unwrap()).unwrap();
        assert_eq!(result.outcome_for(d("2024-08-01")), Some(&Outcome::Inserted { amount_minor: 350 }));
        assert_eq!(result.outcome_for(d("2024-08-02")), Some(&Outcome::Inserted { amount_minor: 99 }));
        assert_eq!(result.inserted_minor(), 449);
    }

    #[test]
    fn malformed_proceeds_and_dates_do_not_abort() {
        let server = MockServer::start();
        mock_report(
            &server,
            "2024-08-01",
            gzip(&tsv(&[("08/01/2024", "N/A"), ("08/01/2024", "2.00"), ("", "50.00"), ("8/1", "50.00")])),
        );
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.outcome_for(d("2024-08-01")), Some(&Outcome::Inserted { amount_minor: 200 }));
        assert_eq!(result.failed(), 0);
    }

    #[test]
    fn rows_outside_period_are_ignored() {
        let server = MockServer::start();
        mock_report(
            &server,
            "2024-08-01",
            gzip(&tsv(&[("08/01/2024", "1.00"), ("07/31/2024", "9.00")])),
        );
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert!(p.store().find_by_date(d("2024-07-31")).unwrap().is_none());
    }

    #[test]
    fn date_column_selects_the_attributed_day() {
        let server = MockServer::start();
        let body = gzip(&format!("{HEADER}\nAPPLE\tsku\tPro\t3\t12.00\t08/04/2024\t08/05/2024\tUSD\n"));
        mock_report(&server, "2024-08-05", body);

        let by_begin = pipeline(&server).ingest_period(ReportPeriod::day(d("2024-08-05"))).unwrap();
        assert_eq!(by_begin.outcome_for(d("2024-08-05")), Some(&Outcome::SkippedNoData));

        let opts = ReportOptions { date_column: DateColumn::EndDate, ..options(&server) };
        let p = AppStorePipeline::new(SqliteRevenueStore::open_in_memory().unwrap(), creds(), opts).unwrap();
        let by_end = p.ingest_period(ReportPeriod::day(d("2024-08-05"))).unwrap();
        assert_eq!(by_end.outcome_for(d("2024-08-05")), Some(&Outcome::Inserted { amount_minor: 1200 }));
        assert!(p.store().find_by_date(d("2024-08-04")).unwrap().is_none());
    }

    #[test]
    fn overflowing_day_total_is_not_stored() {
        let server = MockServer::start();
        mock_report(
            &server,
            "2024-08-01",
            gzip(&tsv(&[("08/01/2024", "9223372036854.775807"), ("08/01/2024", "1")])),
        );
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.skipped_no_data(), 1);
        assert!(matches!(&result.degraded, Some(IngestError::Parse(msg)) if msg.contains("2024-08-01")));
        assert_eq!(p.store().count().unwrap(), 0);
    }

    #[test]
    fn negative_day_total_is_failed_not_stored() {
        let server = MockServer::start();
        mock_report(&server, "2024-08-01", gzip(&tsv(&[("08/01/2024", "-4.99")])));
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.failed(), 1);
        assert!(matches!(result.outcome_for(d("2024-08-01")), Some(Outcome::Failed { reason }) if reason.contains("-4.99")));
        assert_eq!(p.store().count().unwrap(), 0);
    }

    // ── Upstream / parse degradation ────────────────────────────────

    #[test]
    fn non_success_response_yields_no_data() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(404).json_body(serde_json::json!({
                "errors": [{
                    "status": "404",
                    "code": "NOT_FOUND",
                    "title": "The specified resource does not exist",
                    "detail": "There were no sales for the date specified."
                }]
            }));
        });
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::month(2024, 2).unwrap()).unwrap();
        // A missing day does not stop the rest of the month.
        mock.assert_calls(29);
        assert_eq!(result.outcomes.len(), 29);
        assert_eq!(result.skipped_no_data(), 29);
        assert_eq!(result.inserted(), 0);
        assert_eq!(p.store().count().unwrap(), 0);

        let degraded = result.degraded.unwrap();
        assert_eq!(degraded.status(), Some(404));
        assert!(degraded.to_string().contains("no sales for the date"), "{degraded}");
    }

    #[test]
    fn server_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(503);
        });
        let result = pipeline(&server).ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        mock.assert_calls(1);
        assert_eq!(result.skipped_no_data(), 1);
        assert_eq!(result.degraded.and_then(|e| e.status()), Some(503));
    }

    #[test]
    fn auth_rejection_degrades_with_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(401).json_body(serde_json::json!({
                "errors": [{ "status": "401", "code": "NOT_AUTHORIZED", "title": "Authentication credentials are missing or invalid." }]
            }));
        });
        let result = pipeline(&server).ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        let degraded = result.degraded.unwrap();
        assert_eq!(degraded.status(), Some(401));
        assert!(degraded.to_string().contains("auth failed"), "{degraded}");
    }

    #[test]
    fn auth_rejection_stops_the_month_after_one_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(403);
        });
        let result = pipeline(&server).ingest_period(ReportPeriod::month(2024, 8).unwrap()).unwrap();
        mock.assert_calls(1);
        assert_eq!(result.skipped_no_data(), 31);
        assert_eq!(result.degraded.and_then(|e| e.status()), Some(403));
    }

    #[test]
    fn garbage_body_is_parse_degradation() {
        let server = MockServer::start();
        mock_report(&server, "2024-08-01", gzip("Begin Date\tDeveloper Proceeds\n"));
        let p = pipeline(&server);

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.skipped_no_data(), 1);
        assert!(matches!(result.degraded, Some(IngestError::Parse(_))));
        assert_eq!(p.store().count().unwrap(), 0);
    }

    #[test]
    fn unreachable_api_is_upstream_degradation() {
        let opts = ReportOptions {
            api_base: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..ReportOptions::default()
        };
        let p = AppStorePipeline::new(SqliteRevenueStore::open_in_memory().unwrap(), creds(), opts).unwrap();
        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.skipped_no_data(), 1);
        assert!(matches!(result.degraded, Some(IngestError::Upstream { status: None, .. })));
    }

    // ── Configuration fast path ─────────────────────────────────────

    #[test]
    fn missing_credential_sends_nothing() {
        for missing in [KEY_ID_ENV, ISSUER_ID_ENV, PRIVATE_KEY_ENV, VENDOR_NUMBER_ENV] {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET);
                then.status(200).body(gzip(&tsv(&[("08/01/2024", "1.00")])));
            });

            let mut c = creds();
            match missing {
                KEY_ID_ENV => c.key_id = None,
                ISSUER_ID_ENV => c.issuer_id = Some("   ".into()),
                PRIVATE_KEY_ENV => c.private_key = None,
                _ => c.vendor_number = Some(String::new()),
            }
            let store = CountingStore::default();
            let p = AppStorePipeline::new(&store, c, options(&server)).unwrap();

            let err = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap_err();
            assert!(matches!(err, IngestError::Configuration(_)), "{missing}: {err:?}");
            assert!(err.to_string().contains(missing), "{err}");
            mock.assert_calls(0);
            assert_eq!(store.lookups.get(), 0);
        }
    }

    #[test]
    fn unusable_private_key_is_configuration_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET);
            then.status(200);
        });
        let mut c = creds();
        c.private_key = Some("not a key".into());
        let p = AppStorePipeline::new(SqliteRevenueStore::open_in_memory().unwrap(), c, options(&server)).unwrap();
        let err = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
        mock.assert_calls(0);
    }

    // ── Store interaction ───────────────────────────────────────────

    /// Store double that never sees its own writes, so the re-check
    /// passes and the insert hits the uniqueness guard.
    #[derive(Default)]
    struct RacingStore {
        inserts: Cell<usize>,
    }

    impl RevenueStore for RacingStore {
        fn find_by_date(&self, _: NaiveDate) -> Result<Option<DailyRevenueRecord>, StoreError> {
            Ok(None)
        }
        fn list_ascending(&self) -> Result<Vec<DailyRevenueRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn insert(&self, date: NaiveDate, _: i64) -> Result<DailyRevenueRecord, StoreError> {
            self.inserts.set(self.inserts.get() + 1);
            Err(StoreError::Duplicate(date))
        }
    }

    #[test]
    fn concurrent_insert_reports_skipped_existing() {
        let server = MockServer::start();
        mock_report(&server, "2024-08-01", gzip(&tsv(&[("08/01/2024", "1.00")])));
        let store = RacingStore::default();
        let p = AppStorePipeline::new(&store, creds(), options(&server)).unwrap();

        let result = p.ingest_period(ReportPeriod::day(d("2024-08-01"))).unwrap();
        assert_eq!(result.outcome_for(d("2024-08-01")), Some(&Outcome::SkippedExisting));
        assert_eq!(store.inserts.get(), 1);
    }

    /// In-memory store that fails inserts for one date and counts lookups.
    #[derive(Default)]
    struct CountingStore {
        rows: RefCell<Vec<DailyRevenueRecord>>,
        fail_on: Option<NaiveDate>,
        lookups: Cell<usize>,
    }

    impl RevenueStore for CountingStore {
        fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRevenueRecord>, StoreError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self.rows.borrow().iter().find(|r| r.report_date == date).cloned())
        }
        fn list_ascending(&self) -> Result<Vec<DailyRevenueRecord>, StoreError> {
            let mut rows = self.rows.borrow().clone();
            rows.sort_by_key(|r| r.report_date);
            Ok(rows)
        }
        fn insert(&self, date: NaiveDate, proceeds_minor: i64) -> Result<DailyRevenueRecord, StoreError> {
            if self.fail_on == Some(date) {
                return Err(StoreError::Backend("disk I/O error".into()));
            }
            let rec = DailyRevenueRecord::new(date, proceeds_minor, Utc::now())
                .map_err(|e| StoreError::Invalid(e.to_string()))?;
            self.rows.borrow_mut().push(rec.clone());
            Ok(rec)
        }
    }

    #[test]
    fn insert_failure_does_not_block_other_dates() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports");
            then.status(200).body(gzip(&tsv(&[
                ("08/01/2024", "1.00"),
                ("08/02/2024", "2.00"),
                ("08/03/2024", "3.00"),
            ])));
        });
        let store = CountingStore { fail_on: Some(d("2024-08-02")), ..Default::default() };
        let p = AppStorePipeline::new(&store, creds(), options(&server)).unwrap();

        let result = p.ingest_period(ReportPeriod::month(2024, 8).unwrap()).unwrap();
        assert_eq!(result.inserted(), 2);
        assert_eq!(result.failed(), 1);
        assert!(matches!(
            result.outcome_for(d("2024-08-02")),
            Some(Outcome::Failed { reason }) if reason.contains("disk I/O error")
        ));
        assert_eq!(result.outcome_for(d("2024-08-03")), Some(&Outcome::Inserted { amount_minor: 300 }));
        assert!(result.degraded.is_none());
    }

    // ── Backfill ────────────────────────────────────────────────────

    #[test]
    fn backfill_runs_each_day_once() {
        let server = MockServer::start();
        let day1 = mock_report(&server, "2024-08-17", gzip(&tsv(&[("08/17/2024", "6.44")])));
        let day2 = server.mock(|when, then| {
            when.method(GET).path("/v1/salesReports").query_param("filter[reportDate]", "2024-08-18");
            then.status(404);
        });
        let day3 = mock_report(&server, "2024-08-19", gzip(&tsv(&[("08/19/2024", "0.99")])));

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 8, 21, 6, 0, 0).unwrap());
        let p = AppStorePipeline::with_clock(
            SqliteRevenueStore::open_in_memory().unwrap(),
            creds(),
            options(&server),
            &clock,
        )
        .unwrap();

        let results = p.backfill(d("2024-08-17"), d("2024-08-19")).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].inserted(), 1);
        assert_eq!(results[1].skipped_no_data(), 1);
        assert_eq!(results[2].inserted(), 1);
        day1.assert_calls(1);
        day2.assert_calls(1);
        day3.assert_calls(1);

        let stored: Vec<_> = p.store().list_ascending().unwrap().iter().map(|r| r.point()).collect();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].amount_minor, 644);
        assert_eq!(stored[1].date, d("2024-08-19"));
    }

    #[test]
    fn backfill_stops_on_configuration_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET);
            then.status(200);
        });
        let mut c = creds();
        c.vendor_number = None;
        let p = AppStorePipeline::new(SqliteRevenueStore::open_in_memory().unwrap(), c, options(&server)).unwrap();
        assert!(p.backfill(d("2024-08-01"), d("2024-08-05")).is_err());
        mock.assert_calls(0);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let o = DateOutcome { date: d("2024-08-01"), outcome: Outcome::Inserted { amount_minor: 350 } };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json, serde_json::json!({ "date": "2024-08-01", "outcome": "inserted", "amount_minor": 350 }));
    }
}
