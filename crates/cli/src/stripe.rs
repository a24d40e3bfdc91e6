//! `revledger stripe`: daily Stripe revenue as CSV or JSON.

use std::path::PathBuf;
use std::time::Duration;

use revledger_config::{resolve_stripe_key, Settings};
use revledger_ingest::StripeSource;

use crate::common;
use crate::CliError;

pub(crate) fn stripe_source(settings: &Settings, key: String) -> Result<StripeSource, CliError> {
    StripeSource::with_base_url(
        key,
        settings.stripe.api_base.clone(),
        Duration::from_secs(settings.http.timeout_secs),
    )
    .map_err(CliError::ingest)
}

pub(crate) fn cmd_stripe(
    settings: &Settings,
    from: String,
    to: String,
    api_key: Option<String>,
    out: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let key = resolve_stripe_key(api_key).map_err(|e| {
        CliError::config(e).with_hint("use --api-key or set STRIPE_SECRET_KEY")
    })?;
    let (from_date, to_date) = common::parse_date_range(&from, &to)?;

    log::info!("fetching Stripe charges {from_date}..={to_date}");
    let series = stripe_source(settings, key)?
        .daily_series(from_date, to_date)
        .map_err(CliError::ingest)?;

    if json {
        common::write_json(&series, &out)?;
    } else {
        let label = common::write_csv(&["date", "amount_minor"], &series, &out)?;
        log::info!("{} days written to {}", series.len(), label);
    }
    Ok(())
}
