//! `revledger-core`: shared types for the revenue ledger.
//!
//! No IO. Amounts are always `i64` minor units (cents); parsing helpers
//! in [`money`] are the only place decimal strings become integers.

pub mod dates;
pub mod model;
pub mod money;
pub mod period;

pub use model::{ChartRow, DailyRevenueRecord, RecordError, RevenuePoint};
pub use period::{PeriodError, ReportPeriod};
