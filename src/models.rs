//! Data models for report reconciliation.
//!
//! This module contains the core data structures used throughout
//! the application: daily reports and their statuses, the metric
//! catalog, date ranges, and the KPI report handed to the renderers.

use crate::error::{AggregateError, Anomaly};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric totals keyed by metric name.
pub type Summary = BTreeMap<String, u64>;

/// Lifecycle status of a daily report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// First submission of the day
    Set,
    /// Resubmission of the same day
    Edit,
    /// Approved by an administrator
    Ready,
    /// Rejected by an administrator
    Trash,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Set => write!(f, "set"),
            ReportStatus::Edit => write!(f, "edit"),
            ReportStatus::Ready => write!(f, "ready"),
            ReportStatus::Trash => write!(f, "trash"),
        }
    }
}

impl ReportStatus {
    /// Parse a status as stored by the report store. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "set" => Some(ReportStatus::Set),
            "edit" => Some(ReportStatus::Edit),
            "ready" => Some(ReportStatus::Ready),
            "trash" => Some(ReportStatus::Trash),
            _ => None,
        }
    }

    /// Rank used when picking the canonical report; higher wins.
    /// `None` means the report is never eligible.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            ReportStatus::Ready => Some(3),
            ReportStatus::Set => Some(2),
            ReportStatus::Edit => Some(1),
            ReportStatus::Trash => None,
        }
    }

    /// Submitted but not yet reviewed by an administrator.
    pub fn is_pending(&self) -> bool {
        matches!(self, ReportStatus::Set | ReportStatus::Edit)
    }
}

/// One daily activity submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Opaque row identifier.
    pub id: String,
    /// Owning agent.
    pub user_id: String,
    /// Calendar day the report covers.
    pub date: NaiveDate,
    pub status: ReportStatus,
    /// Submission time, used to order same-day submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Metric counts. Absent metrics count as zero.
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
}

impl Report {
    /// Returns the value of a metric, zero when absent.
    pub fn metric(&self, key: &str) -> u64 {
        self.metrics.get(key).copied().unwrap_or(0)
    }
}

/// Agent profile attached to report rows by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl Profile {
    /// Full name when known, otherwise the email, otherwise `None`.
    pub fn display_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !name.is_empty() {
            Some(name)
        } else {
            self.email.clone().filter(|e| !e.is_empty())
        }
    }
}

/// Which half of the sales process a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSide {
    Seller,
    Buyer,
}

impl fmt::Display for MetricSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSide::Seller => write!(f, "Seller"),
            MetricSide::Buyer => write!(f, "Buyer"),
        }
    }
}

/// Whether a metric counts events or sums a currency amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Count,
    Amount,
}

/// Catalog entry for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    pub key: &'static str,
    pub label: &'static str,
    pub side: MetricSide,
    pub kind: MetricKind,
    /// Older field names folded into `key` on parse.
    pub aliases: &'static [&'static str],
}

const fn count(key: &'static str, label: &'static str, side: MetricSide) -> MetricDef {
    MetricDef {
        key,
        label,
        side,
        kind: MetricKind::Count,
        aliases: &[],
    }
}

/// Every metric a daily report can carry.
pub const METRIC_CATALOG: &[MetricDef] = &[
    count("calls_sellers", "Calls to sellers", MetricSide::Seller),
    count("meetings_sellers", "Meetings with sellers", MetricSide::Seller),
    count("contracts_sellers", "Contracts with sellers", MetricSide::Seller),
    count("showings_sellers", "Showings for sellers", MetricSide::Seller),
    count("banners", "Banners", MetricSide::Seller),
    MetricDef {
        key: "sma_analytics",
        label: "Comparative market analyses",
        side: MetricSide::Seller,
        kind: MetricKind::Count,
        aliases: &["v"],
    },
    count("objects_uploaded", "Listings uploaded", MetricSide::Seller),
    count("pro_photos", "Professional photo shoots", MetricSide::Seller),
    count("price_reductions", "Price reductions", MetricSide::Seller),
    MetricDef {
        key: "sum_price_reduction",
        label: "Price reduction total",
        side: MetricSide::Seller,
        kind: MetricKind::Amount,
        aliases: &[],
    },
    count("calls_buyers", "Calls to buyers", MetricSide::Buyer),
    count("incoming_calls", "Incoming calls", MetricSide::Buyer),
    count("statuses", "Messenger statuses", MetricSide::Buyer),
    count("stickers", "Stickers distributed", MetricSide::Buyer),
    count("meetings_buyers", "Meetings with buyers", MetricSide::Buyer),
    count("contracts_buyers", "Contracts with buyers", MetricSide::Buyer),
    count("showings_buyers", "Showings for buyers", MetricSide::Buyer),
];

/// Look up a metric by key or alias.
pub fn metric_def(name: &str) -> Option<&'static MetricDef> {
    METRIC_CATALOG
        .iter()
        .find(|m| m.key == name || m.aliases.contains(&name))
}

/// All catalog keys, in catalog order.
pub fn default_metric_keys() -> Vec<String> {
    METRIC_CATALOG.iter().map(|m| m.key.to_string()).collect()
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Create a range; `from` must not be after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, AggregateError> {
        if from > to {
            return Err(AggregateError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// A range covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Number of days in the range, both ends included.
    pub fn num_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.from, self.to)
    }
}

/// Reporting period presets, each a trailing window ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    Today,
    Yesterday,
    Week,
    Month,
    HalfYear,
    Year,
    All,
}

impl Period {
    /// Resolve the preset against `today`.
    pub fn range(&self, today: NaiveDate) -> DateRange {
        let from = match self {
            Period::Today => Some(today),
            Period::Yesterday => today.pred_opt(),
            Period::Week => today.checked_sub_days(chrono::Days::new(7)),
            Period::Month => today.checked_sub_months(Months::new(1)),
            Period::HalfYear => today.checked_sub_months(Months::new(6)),
            Period::Year => today.checked_sub_months(Months::new(12)),
            Period::All => NaiveDate::from_ymd_opt(1970, 1, 1),
        }
        .unwrap_or(NaiveDate::MIN)
        .min(today);

        DateRange { from, to: today }
    }
}

/// Administrator roster line for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report_date: Option<NaiveDate>,
    /// Canonical reports in the range.
    pub report_count: usize,
    pub reported_today: bool,
    /// Today's canonical report is still `set` or `edit`.
    pub unverified_today: bool,
    /// Some earlier canonical report is still `set` or `edit`.
    pub unverified_earlier: bool,
    /// Last report is older than today.
    pub stale: bool,
}

impl RosterEntry {
    pub fn is_unverified(&self) -> bool {
        self.unverified_today || self.unverified_earlier
    }
}

/// One stage of a sales funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub key: String,
    pub label: String,
    pub value: u64,
    /// Ratio to the previous stage, `None` for the first stage or when
    /// the previous stage is zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<f64>,
}

/// Metric total for a contiguous run of days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBin {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub value: u64,
}

/// KPI card for a selected agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserKpi {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub report_count: usize,
    pub summary: Summary,
    pub seller_funnel: Vec<FunnelStage>,
    pub buyer_funnel: Vec<FunnelStage>,
    /// Calls to sellers per chart bucket.
    pub seller_activity: Vec<ActivityBin>,
    /// Calls to buyers per chart bucket.
    pub buyer_activity: Vec<ActivityBin>,
}

/// Metadata about the KPI report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Where the rows came from (file path or store URL).
    pub source: String,
    pub generated_at: DateTime<Utc>,
    /// Day treated as "today" for roster flags.
    pub today: NaiveDate,
    pub range: DateRange,
    pub rows_fetched: usize,
    pub canonical_reports: usize,
    pub duration_seconds: f64,
}

/// The complete KPI report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiReport {
    pub metadata: ReportMetadata,
    /// Totals across every agent in the range.
    pub totals: Summary,
    pub roster: Vec<RosterEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<UserKpi>,
    pub warnings: Vec<Anomaly>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(ReportStatus::parse("READY"), Some(ReportStatus::Ready));
        assert_eq!(ReportStatus::parse(" set "), Some(ReportStatus::Set));
        assert_eq!(ReportStatus::parse("approved"), None);
        assert_eq!(ReportStatus::Trash.to_string(), "trash");
    }

    #[test]
    fn test_status_precedence_order() {
        assert!(ReportStatus::Ready.precedence() > ReportStatus::Set.precedence());
        assert!(ReportStatus::Set.precedence() > ReportStatus::Edit.precedence());
        assert_eq!(ReportStatus::Trash.precedence(), None);
        assert!(ReportStatus::Edit.is_pending());
        assert!(!ReportStatus::Ready.is_pending());
    }

    #[test]
    fn test_metric_lookup_with_alias() {
        assert_eq!(metric_def("v").map(|m| m.key), Some("sma_analytics"));
        assert_eq!(
            metric_def("sum_price_reduction").map(|m| m.kind),
            Some(MetricKind::Amount)
        );
        assert!(metric_def("unknown").is_none());
        assert_eq!(default_metric_keys().len(), METRIC_CATALOG.len());
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(date("2024-01-02"), date("2024-01-01")).is_err());

        let range = DateRange::new(date("2024-01-01"), date("2024-01-07")).unwrap();
        assert_eq!(range.num_days(), 7);
        assert!(range.contains(date("2024-01-07")));
        assert!(!range.contains(date("2024-01-08")));
    }

    #[test]
    fn test_period_ranges() {
        let today = date("2024-03-31");
        assert_eq!(Period::Today.range(today), DateRange::day(today));
        assert_eq!(Period::Yesterday.range(today).from(), date("2024-03-30"));
        assert_eq!(Period::Week.range(today).from(), date("2024-03-24"));
        assert_eq!(Period::Month.range(today).from(), date("2024-02-29"));
        assert_eq!(Period::Year.range(today).from(), date("2023-03-31"));
        assert_eq!(Period::All.range(today).from(), date("1970-01-01"));
        assert_eq!(Period::HalfYear.range(today).to(), today);
    }

    #[test]
    fn test_profile_display_name() {
        let profile = Profile {
            email: Some("anna@example.com".to_string()),
            first_name: Some("Anna".to_string()),
            last_name: None,
        };
        assert_eq!(profile.display_name(), Some("Anna".to_string()));

        let email_only = Profile {
            email: Some("anna@example.com".to_string()),
            ..Profile::default()
        };
        assert_eq!(
            email_only.display_name(),
            Some("anna@example.com".to_string())
        );
        assert_eq!(Profile::default().display_name(), None);
    }
}
