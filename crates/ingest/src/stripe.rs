//! Stripe charge history as a daily revenue series.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate};

use revledger_core::RevenuePoint;

use crate::client::FetchClient;
use crate::error::IngestError;

const PAGE_LIMIT: u32 = 100;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Charge {
    id: String,
    created_epoch: i64,
    amount_minor: i64,
    refunded_minor: i64,
    paid: bool,
}

impl Charge {
    /// Revenue this charge contributes: nothing unless paid, net of refunds.
    fn net_minor(&self) -> i64 {
        if self.paid {
            self.amount_minor - self.refunded_minor
        } else {
            0
        }
    }
}

fn epoch_to_date(epoch: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(epoch, 0).map(|dt| dt.date_naive())
}

fn date_to_epoch(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

pub struct StripeSource {
    client: FetchClient,
    api_key: String,
    base_url: String,
}

impl StripeSource {
    pub fn with_base_url(api_key: String, base_url: String, timeout: Duration) -> Result<Self, IngestError> {
        if api_key.trim().is_empty() {
            return Err(IngestError::Configuration("missing Stripe secret key".into()));
        }
        let client = FetchClient::new("Stripe", extract_stripe_error, timeout)?.with_retries(MAX_RETRIES);
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[cfg(test)]
    fn without_backoff(mut self) -> Self {
        self.client = self.client.with_initial_backoff(Duration::ZERO);
        self
    }

    /// Paid revenue per UTC day for every day in `[from, to]` that had
    /// charges, date ascending.
    pub fn daily_series(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RevenuePoint>, IngestError> {
        if from > to {
            return Ok(Vec::new());
        }
        let end = to.checked_add_days(Days::new(1)).unwrap_or(to);
        let charges = self.fetch_charges(date_to_epoch(from), date_to_epoch(end))?;

        let mut by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        let mut unpaid = 0usize;
        for charge in &charges {
            if !charge.paid {
                unpaid += 1;
                continue;
            }
            let Some(date) = epoch_to_date(charge.created_epoch) else {
                log::warn!("Stripe charge {} has out-of-range created {}", charge.id, charge.created_epoch);
                continue;
            };
            *by_day.entry(date).or_insert(0) += charge.net_minor();
        }
        log::info!(
            "Stripe {from}..={to}: {} charges ({} unpaid skipped) over {} days",
            charges.len(),
            unpaid,
            by_day.len(),
        );

        Ok(by_day
            .into_iter()
            .map(|(date, amount_minor)| RevenuePoint { date, amount_minor })
            .collect())
    }

    /// Every charge created in `[from_epoch, to_epoch)`.
    fn fetch_charges(&self, from_epoch: i64, to_epoch: i64) -> Result<Vec<Charge>, IngestError> {
        let mut all = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut page = 0u32;
        let url = format!("{}/v1/charges", self.base_url);

        loop {
            page += 1;
            let mut params = vec![
                ("created[gte]".to_string(), from_epoch.to_string()),
                ("created[lt]".to_string(), to_epoch.to_string()),
                ("limit".to_string(), PAGE_LIMIT.to_string()),
            ];
            if let Some(ref after) = starting_after {
                params.push(("starting_after".to_string(), after.clone()));
            }

            let body = self
                .client
                .get_json(|http| http.get(&url).basic_auth(&self.api_key, Some("")).query(&params))?;

            let data = body["data"]
                .as_array()
                .ok_or_else(|| IngestError::upstream(None, "Stripe response missing 'data' array"))?;
            let has_more = body["has_more"].as_bool().unwrap_or(false);

            // has_more with nothing in it would page forever
            if has_more && data.is_empty() {
                return Err(IngestError::upstream(
                    None,
                    "Stripe returned has_more=true with empty data (malformed response)",
                ));
            }
            log::debug!("Stripe page {page}: {} charges", data.len());

            for item in data {
                all.push(parse_charge(item)?);
            }

            if !has_more {
                break;
            }

            let last_id = all
                .last()
                .map(|c| c.id.clone())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| IngestError::upstream(None, "Stripe charge missing 'id' field for pagination"))?;

            if starting_after.as_deref() == Some(last_id.as_str()) {
                return Err(IngestError::upstream(
                    None,
                    format!("Stripe pagination stuck: starting_after={last_id} repeated"),
                ));
            }
            starting_after = Some(last_id);
        }

        Ok(all)
    }
}

fn parse_charge(item: &serde_json::Value) -> Result<Charge, IngestError> {
    let created = item["created"]
        .as_i64()
        .ok_or_else(|| IngestError::upstream(None, "Stripe charge missing 'created' field"))?;
    let amount = item["amount"]
        .as_i64()
        .ok_or_else(|| IngestError::upstream(None, "Stripe charge missing 'amount' field"))?;

    Ok(Charge {
        id: item["id"].as_str().unwrap_or("").to_string(),
        created_epoch: created,
        amount_minor: amount,
        refunded_minor: item["amount_refunded"].as_i64().unwrap_or(0),
        paid: item["paid"].as_bool().unwrap_or(false),
    })
}

fn extract_stripe_error(body: &serde_json::Value, status: u16) -> String {
    body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
