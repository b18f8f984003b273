//! Report store collaborators.
//!
//! Rows come either from exported JSON files on disk or from the hosted
//! report table. Both hand back raw `serde_json::Value` rows; parsing and
//! validation happen in [`crate::analysis`].

pub mod file;
pub mod remote;

pub use file::FileStore;
pub use remote::RemoteStore;

use crate::analysis::aggregator::{parse_date, scalar_to_string};
use crate::models::DateRange;
use anyhow::Result;
use serde_json::Value;

/// Filter applied when fetching rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    /// Restrict to one agent.
    pub user_id: Option<String>,
    /// Inclusive date range.
    pub range: DateRange,
}

impl ReportQuery {
    /// Whether a raw row passes the filter.
    ///
    /// Rows whose `user_id` or `date` can't be read are kept so the parser
    /// can report them as malformed.
    pub fn matches(&self, row: &Value) -> bool {
        if let Some(ref wanted) = self.user_id {
            if let Some(user_id) = row.get("user_id").and_then(scalar_to_string) {
                if &user_id != wanted {
                    return false;
                }
            }
        }

        match row.get("date").and_then(Value::as_str).and_then(parse_date) {
            Some(date) => self.range.contains(date),
            None => true,
        }
    }
}

/// Where report rows are read from.
#[derive(Debug, Clone)]
pub enum ReportSource {
    File(FileStore),
    Remote(RemoteStore),
}

impl ReportSource {
    /// Fetch the raw rows matching `query`.
    pub async fn fetch(&self, query: &ReportQuery) -> Result<Vec<Value>> {
        match self {
            ReportSource::File(store) => store.fetch(query),
            ReportSource::Remote(store) => store.fetch(query).await,
        }
    }

    /// Human-readable origin, used in report metadata.
    pub fn describe(&self) -> String {
        match self {
            ReportSource::File(store) => store.path().display().to_string(),
            ReportSource::Remote(store) => store.base_url().to_string(),
        }
    }
}
