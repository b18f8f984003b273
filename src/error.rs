//! Error and anomaly types for the aggregation engine.
//!
//! [`AggregateError`] covers precondition violations raised by callers.
//! [`Anomaly`] covers data problems the engine recovers from locally and
//! reports on the side; it is never returned as an `Err`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precondition violations. These indicate a programming error in the
/// caller, not bad data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("expected a JSON array of report rows, got {0}")]
    NotAList(&'static str),

    #[error("activity chart needs at least one bin")]
    InvalidBinCount,
}

/// Recoverable data anomalies found while parsing or reconciling rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A row without a usable `user_id`, `date` or `status`. The row is skipped.
    #[error("row {index} skipped: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// A metric field whose value was dropped or truncated. The row is kept.
    #[error("row {index}: {field} {reason}")]
    CoercedMetric {
        index: usize,
        field: String,
        reason: String,
    },

    /// More than one `ready` report for the same user and day. The latest wins.
    #[error("{count} ready reports for user {user_id} on {date}; kept the latest")]
    DuplicateReady {
        user_id: String,
        date: NaiveDate,
        count: usize,
    },
}
