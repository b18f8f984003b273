//! Report reconciliation and KPI aggregation.
//!
//! Raw store rows are parsed into [`Report`]s, collapsed into one
//! canonical report per agent and day, and summed into metric totals.
//! Everything here is pure: no I/O, no state kept between calls.

use crate::error::{AggregateError, Anomaly};
use crate::models::{metric_def, Profile, Report, ReportStatus, Summary};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Row fields that are never treated as metrics.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "user_id",
    "date",
    "status",
    "created_at",
    "updated_at",
    "profile",
];

/// Result of parsing a batch of raw rows.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub reports: Vec<Report>,
    /// Profiles embedded in the rows, keyed by user id.
    pub profiles: BTreeMap<String, Profile>,
    pub anomalies: Vec<Anomaly>,
}

/// Parse a JSON payload that must be an array of rows.
pub fn parse_value(payload: &Value) -> Result<ParsedBatch, AggregateError> {
    match payload {
        Value::Array(rows) => Ok(parse_rows(rows)),
        Value::Object(_) => Err(AggregateError::NotAList("an object")),
        Value::String(_) => Err(AggregateError::NotAList("a string")),
        Value::Number(_) => Err(AggregateError::NotAList("a number")),
        Value::Bool(_) => Err(AggregateError::NotAList("a boolean")),
        Value::Null => Err(AggregateError::NotAList("null")),
    }
}

/// Parse raw rows, skipping malformed ones.
///
/// A row needs a `user_id`, a `date` and a known `status`. Any other
/// numeric field is read as a metric. Negative values and non-numeric
/// values of catalog metrics are dropped so they sum as zero; fractions
/// are truncated. Each such change is recorded as
/// [`Anomaly::CoercedMetric`].
pub fn parse_rows(rows: &[Value]) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let mut malformed = 0;

    for (index, row) in rows.iter().enumerate() {
        match parse_row(row) {
            Ok(parsed) => {
                for (field, reason) in parsed.coerced {
                    warn!("Report row {}: {} {}", index, field, reason);
                    batch.anomalies.push(Anomaly::CoercedMetric {
                        index,
                        field,
                        reason,
                    });
                }
                if let Some(profile) = parsed.profile {
                    batch
                        .profiles
                        .insert(parsed.report.user_id.clone(), profile);
                }
                batch.reports.push(parsed.report);
            }
            Err(reason) => {
                warn!("Skipping malformed report row {}: {}", index, reason);
                malformed += 1;
                batch
                    .anomalies
                    .push(Anomaly::MalformedRecord { index, reason });
            }
        }
    }

    debug!(
        "Parsed {} of {} rows ({} malformed)",
        batch.reports.len(),
        rows.len(),
        malformed
    );

    batch
}

/// One parsed row plus the metric fields that had to be coerced.
struct ParsedRow {
    report: Report,
    profile: Option<Profile>,
    coerced: Vec<(String, String)>,
}

fn parse_row(row: &Value) -> Result<ParsedRow, String> {
    let obj = row.as_object().ok_or("row is not an object")?;

    let user_id = obj
        .get("user_id")
        .and_then(scalar_to_string)
        .ok_or("missing user_id")?;

    let raw_date = obj
        .get("date")
        .and_then(Value::as_str)
        .ok_or("missing date")?;
    let date = parse_date(raw_date).ok_or_else(|| format!("invalid date '{}'", raw_date))?;

    let raw_status = obj
        .get("status")
        .and_then(Value::as_str)
        .ok_or("missing status")?;
    let status =
        ReportStatus::parse(raw_status).ok_or_else(|| format!("unknown status '{}'", raw_status))?;

    let mut metrics = BTreeMap::new();
    let mut coerced = Vec::new();
    for (name, value) in obj {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let def = metric_def(name);
        let key = def.map(|m| m.key).unwrap_or(name.as_str());
        // An alias only counts when the row lacks the canonical column.
        if key != name.as_str() && obj.contains_key(key) {
            continue;
        }

        let amount = match metric_value(value) {
            MetricValue::Whole(v) => v,
            MetricValue::Truncated(v, reason) => {
                coerced.push((name.clone(), reason));
                v
            }
            MetricValue::Dropped(reason) => {
                // Free-text columns outside the catalog are not metrics.
                if def.is_some() || value.is_number() {
                    coerced.push((name.clone(), reason));
                }
                continue;
            }
            MetricValue::Absent => continue,
        };

        let total: &mut u64 = metrics.entry(key.to_string()).or_insert(0);
        *total = total.saturating_add(amount);
    }

    let profile = obj
        .get("profile")
        .filter(|p| p.is_object())
        .and_then(|p| serde_json::from_value::<Profile>(p.clone()).ok());

    let report = Report {
        id: obj.get("id").and_then(scalar_to_string).unwrap_or_default(),
        user_id,
        date,
        status,
        created_at: obj.get("created_at").and_then(parse_timestamp),
        metrics,
    };

    Ok(ParsedRow {
        report,
        profile,
        coerced,
    })
}

/// Strings and numbers as identifiers; empty strings count as missing.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `YYYY-MM-DD`, ignoring any `T...` time suffix.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.trim().split('T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// How a raw field reads as a metric.
enum MetricValue {
    Whole(u64),
    /// Kept after dropping the fractional part.
    Truncated(u64, String),
    /// Not counted.
    Dropped(String),
    /// `null`: the field was left empty.
    Absent,
}

fn metric_value(value: &Value) -> MetricValue {
    let n = match value {
        Value::Null => return MetricValue::Absent,
        Value::Number(n) => n,
        Value::String(s) => {
            return MetricValue::Dropped(format!("non-numeric value {:?} ignored", s))
        }
        _ => return MetricValue::Dropped("non-numeric value ignored".to_string()),
    };

    if let Some(v) = n.as_u64() {
        return MetricValue::Whole(v);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => MetricValue::Whole(f as u64),
        Some(f) if f.is_finite() && f >= 0.0 => {
            let whole = f.trunc() as u64;
            MetricValue::Truncated(whole, format!("fractional value {} truncated to {}", n, whole))
        }
        Some(f) if f < 0.0 => MetricValue::Dropped(format!("negative value {} ignored", n)),
        _ => MetricValue::Dropped(format!("value {} out of range ignored", n)),
    }
}

/// How to choose between several reports for the same agent and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// When true, the latest of `set`/`edit` wins. When false, any `set`
    /// beats any `edit`.
    pub edit_supersedes_set: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            edit_supersedes_set: true,
        }
    }
}

impl ReconcilePolicy {
    fn tier(&self, status: ReportStatus) -> u8 {
        match status {
            ReportStatus::Ready => 3,
            ReportStatus::Set => 2,
            ReportStatus::Edit if self.edit_supersedes_set => 2,
            ReportStatus::Edit => 1,
            ReportStatus::Trash => 0,
        }
    }

    /// Total order over same-day candidates; the greatest is canonical.
    ///
    /// Status tier first, then `created_at` (missing sorts first), then
    /// status precedence, then id, then metric values.
    pub fn compare(&self, a: &Report, b: &Report) -> Ordering {
        self.tier(a.status)
            .cmp(&self.tier(b.status))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.status.precedence().cmp(&b.status.precedence()))
            .then_with(|| a.id.cmp(&b.id))
            .then_with(|| a.metrics.cmp(&b.metrics))
    }
}

/// Canonical reports plus the anomalies recovered along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// One report per `(user_id, date)`, sorted by user then date.
    pub reports: Vec<Report>,
    pub anomalies: Vec<Anomaly>,
}

/// Pick one canonical report per agent and day with the default policy.
pub fn reconcile(reports: &[Report]) -> Vec<Report> {
    reconcile_with_policy(reports, ReconcilePolicy::default()).reports
}

/// Like [`reconcile`], also returning duplicate-ready advisories.
pub fn reconcile_with_diagnostics(reports: &[Report]) -> Reconciled {
    reconcile_with_policy(reports, ReconcilePolicy::default())
}

/// Pick one canonical report per agent and day.
///
/// Trashed reports are dropped before selection, so a day with only
/// trashed reports has no entry.
pub fn reconcile_with_policy(reports: &[Report], policy: ReconcilePolicy) -> Reconciled {
    let mut days: BTreeMap<(&str, NaiveDate), Vec<&Report>> = BTreeMap::new();

    for report in reports.iter().filter(|r| r.status != ReportStatus::Trash) {
        days.entry((report.user_id.as_str(), report.date))
            .or_default()
            .push(report);
    }

    let mut result = Reconciled::default();

    for ((user_id, date), candidates) in days {
        let ready = candidates
            .iter()
            .filter(|r| r.status == ReportStatus::Ready)
            .count();
        if ready > 1 {
            warn!(
                "{} ready reports for user {} on {}, keeping the latest",
                ready, user_id, date
            );
            result.anomalies.push(Anomaly::DuplicateReady {
                user_id: user_id.to_string(),
                date,
                count: ready,
            });
        }

        if let Some(best) = candidates.into_iter().max_by(|a, b| policy.compare(a, b)) {
            result.reports.push(best.clone());
        }
    }

    result
}

/// Sum the requested metrics across `reports`.
///
/// Every requested key is present in the result; keys no report carries
/// total zero.
pub fn summarize<S: AsRef<str>>(reports: &[Report], metric_keys: &[S]) -> Summary {
    let mut summary: Summary = metric_keys
        .iter()
        .map(|k| (k.as_ref().to_string(), 0))
        .collect();

    for report in reports {
        for (key, total) in summary.iter_mut() {
            *total = total.saturating_add(report.metric(key));
        }
    }

    summary
}

/// Group reports by agent, keeping input order within each group.
pub fn group_by_user(reports: &[Report]) -> BTreeMap<String, Vec<Report>> {
    let mut grouped: BTreeMap<String, Vec<Report>> = BTreeMap::new();

    for report in reports {
        grouped
            .entry(report.user_id.clone())
            .or_default()
            .push(report.clone());
    }

    grouped
}

/// Status a new submission should carry given the agent's reports for today.
pub fn submission_status_for(existing_today: &[Report]) -> ReportStatus {
    if existing_today
        .iter()
        .any(|r| r.status == ReportStatus::Set)
    {
        ReportStatus::Edit
    } else {
        ReportStatus::Set
    }
}
