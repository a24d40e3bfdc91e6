//! `revledger-ingest`: pulls revenue from the App Store and Stripe.
//!
//! - [`pipeline`]: App Store sales-report ingestion into a [`RevenueStore`]
//! - [`stripe`]: Stripe charge history as a daily series
//! - [`feed`]: cached read path and the combined chart series
//!
//! All network IO is blocking `reqwest`.
//!
//! [`RevenueStore`]: revledger_store::RevenueStore

pub mod aggregate;
pub mod cache;
mod client;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod report;
pub mod stripe;
pub mod token;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use error::IngestError;
pub use feed::{combine_series, RevenueFeed};
pub use pipeline::{AppStorePipeline, DateOutcome, IngestResult, Outcome, ReportOptions};
pub use report::ReportRow;
pub use stripe::StripeSource;
