//! Read side: stored App Store days, cached, and the combined chart series.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;

use revledger_core::dates::days_inclusive;
use revledger_core::{ChartRow, RevenuePoint};
use revledger_store::RevenueStore;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::error::IngestError;

/// Serves the stored App Store series through a [`TtlCache`].
pub struct RevenueFeed<S, C = SystemClock> {
    store: S,
    clock: C,
    cache: TtlCache<Vec<RevenuePoint>>,
}

impl<S: RevenueStore> RevenueFeed<S, SystemClock> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self::with_clock(store, SystemClock, ttl)
    }
}

impl<S: RevenueStore, C: Clock> RevenueFeed<S, C> {
    pub fn with_clock(store: S, clock: C, ttl: Duration) -> Self {
        Self { store, clock, cache: TtlCache::new(ttl) }
    }

    /// Every stored day, date ascending. Hits the store only when the
    /// cached copy is older than the TTL.
    pub fn app_store_series(&mut self) -> Result<Vec<RevenuePoint>, IngestError> {
        let now = self.clock.now();
        if let Some(points) = self.cache.get(now) {
            log::debug!("app store series served from cache");
            return Ok(points.clone());
        }

        let points: Vec<RevenuePoint> = self
            .store
            .list_ascending()?
            .iter()
            .map(|r| r.point())
            .collect();
        self.cache.put(points.clone(), now);
        Ok(points)
    }

    /// Drop the cached series, e.g. right after an ingestion run.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

/// Merge both sources into one row per day of `[from, to]`.
///
/// Days without revenue get zeros, points outside the range are ignored,
/// and `cumulative_minor` runs from `from`.
pub fn combine_series(
    app_store: &[RevenuePoint],
    stripe: &[RevenuePoint],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<ChartRow> {
    let by_day = |points: &[RevenuePoint]| {
        let mut map: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for p in points.iter().filter(|p| p.date >= from && p.date <= to) {
            *map.entry(p.date).or_insert(0) += p.amount_minor;
        }
        map
    };
    let app = by_day(app_store);
    let web = by_day(stripe);

    let mut cumulative = 0i64;
    days_inclusive(from, to)
        .into_iter()
        .map(|date| {
            let app_store_minor = app.get(&date).copied().unwrap_or(0);
            let stripe_minor = web.get(&date).copied().unwrap_or(0);
            cumulative += app_store_minor + stripe_minor;
            ChartRow { date, app_store_minor, stripe_minor, cumulative_minor: cumulative }
        })
        .collect()
}
