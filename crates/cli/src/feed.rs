//! `revledger feed`: combined App Store + Stripe chart series.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;

use revledger_config::{resolve_stripe_key, Settings};
use revledger_core::RevenuePoint;
use revledger_ingest::{combine_series, RevenueFeed};

use crate::common;
use crate::stripe::stripe_source;
use crate::CliError;

pub(crate) fn cmd_feed(
    settings: &Settings,
    from: Option<String>,
    to: Option<String>,
    api_key: Option<String>,
    no_stripe: bool,
    out: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let from_date = match from {
        Some(s) => common::parse_date("--from", &s)?,
        None => settings.stripe.revenue_start,
    };
    let to_date = match to {
        Some(s) => common::parse_date("--to", &s)?,
        None => Utc::now().date_naive(),
    };
    if from_date > to_date {
        return Err(CliError::args(format!(
            "--from ({from_date}) must not be after --to ({to_date})"
        )));
    }

    let store = common::open_store(&settings.store.effective_path())?;
    let mut feed = RevenueFeed::new(store, Duration::from_secs(settings.feed.cache_ttl_secs));
    let app_store = feed.app_store_series().map_err(CliError::ingest)?;

    let stripe = if no_stripe {
        Vec::new()
    } else {
        stripe_series(settings, api_key, from_date.max(settings.stripe.revenue_start), to_date)
    };

    let rows = combine_series(&app_store, &stripe, from_date, to_date);
    if json {
        common::write_json(&rows, &out)?;
    } else {
        common::write_csv(
            &["date", "app_store_minor", "stripe_minor", "cumulative_minor"],
            &rows,
            &out,
        )?;
    }
    Ok(())
}

/// The Stripe half of the feed. A missing key or failed request leaves
/// the Stripe column at zero rather than failing the whole feed.
fn stripe_series(
    settings: &Settings,
    api_key: Option<String>,
    from: chrono::NaiveDate,
    to: chrono::NaiveDate,
) -> Vec<RevenuePoint> {
    if from > to {
        return Vec::new();
    }
    let key = match resolve_stripe_key(api_key) {
        Ok(k) => k,
        Err(e) => {
            log::warn!("Stripe column omitted: {e}");
            return Vec::new();
        }
    };
    let result = stripe_source(settings, key)
        .map_err(|e| e.message)
        .and_then(|src| src.daily_series(from, to).map_err(|e| e.to_string()));
    match result {
        Ok(series) => series,
        Err(msg) => {
            log::warn!("Stripe column omitted: {msg}");
            Vec::new()
        }
    }
}
