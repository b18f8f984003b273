//! Assembly of the full KPI report from fetched rows.

use crate::analysis::activity::{activity_bins, chart_metric, funnel};
use crate::analysis::aggregator::{parse_rows, reconcile_with_policy, summarize, ReconcilePolicy};
use crate::analysis::roster::build_roster;
use crate::error::AggregateError;
use crate::models::{
    DateRange, KpiReport, MetricSide, Profile, Report, ReportMetadata, UserKpi,
};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Inputs for one report run.
#[derive(Debug, Clone)]
pub struct KpiRequest {
    pub today: NaiveDate,
    pub range: DateRange,
    /// Agent to build a KPI card for.
    pub user_id: Option<String>,
    pub metric_keys: Vec<String>,
    pub policy: ReconcilePolicy,
    pub chart_bins: usize,
}

/// Parse, reconcile and total `rows` into a [`KpiReport`].
///
/// Rows outside the requested range are ignored. `duration_seconds` is
/// left at zero for the caller to fill in.
pub fn build_kpi_report(
    rows: &[Value],
    source: impl Into<String>,
    request: &KpiRequest,
) -> Result<KpiReport, AggregateError> {
    let batch = parse_rows(rows);
    let in_range: Vec<Report> = batch
        .reports
        .into_iter()
        .filter(|r| request.range.contains(r.date))
        .collect();
    debug!("{} parsed reports within {}", in_range.len(), request.range);

    let reconciled = reconcile_with_policy(&in_range, request.policy);
    let canonical = reconciled.reports;
    info!(
        "Reconciled {} rows into {} canonical reports",
        rows.len(),
        canonical.len()
    );

    let totals = summarize(&canonical, &request.metric_keys);
    let roster = build_roster(&canonical, &batch.profiles, request.today);

    let selected = match request.user_id {
        Some(ref user_id) => Some(user_kpi(user_id, &canonical, &batch.profiles, request)?),
        None => None,
    };

    let mut warnings = batch.anomalies;
    warnings.extend(reconciled.anomalies);

    Ok(KpiReport {
        metadata: ReportMetadata {
            source: source.into(),
            generated_at: Utc::now(),
            today: request.today,
            range: request.range,
            rows_fetched: rows.len(),
            canonical_reports: canonical.len(),
            duration_seconds: 0.0,
        },
        totals,
        roster,
        selected,
        warnings,
    })
}

fn user_kpi(
    user_id: &str,
    canonical: &[Report],
    profiles: &BTreeMap<String, Profile>,
    request: &KpiRequest,
) -> Result<UserKpi, AggregateError> {
    let reports: Vec<Report> = canonical
        .iter()
        .filter(|r| r.user_id == user_id)
        .cloned()
        .collect();

    let summary = summarize(&reports, &request.metric_keys);
    // Funnels always use the full catalog so stages never read as zero
    // just because a key was left out of the selection.
    let funnel_summary = summarize(&reports, &crate::models::default_metric_keys());
    let activity = |side| {
        activity_bins(&reports, request.range, chart_metric(side), request.chart_bins)
    };

    Ok(UserKpi {
        user_id: user_id.to_string(),
        display_name: profiles.get(user_id).and_then(Profile::display_name),
        report_count: reports.len(),
        seller_funnel: funnel(&funnel_summary, MetricSide::Seller),
        buyer_funnel: funnel(&funnel_summary, MetricSide::Buyer),
        seller_activity: activity(MetricSide::Seller)?,
        buyer_activity: activity(MetricSide::Buyer)?,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Anomaly;
    use crate::models::default_metric_keys;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn request(user: Option<&str>) -> KpiRequest {
        KpiRequest {
            today: date("2024-01-07"),
            range: DateRange::new(date("2024-01-01"), date("2024-01-07")).unwrap(),
            user_id: user.map(String::from),
            metric_keys: default_metric_keys(),
            policy: ReconcilePolicy::default(),
            chart_bins: 7,
        }
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "user_id": "u1", "date": "2024-01-01", "status": "set",
                   "created_at": "2024-01-01T09:00:00Z", "calls_sellers": 10, "meetings_sellers": 2,
                   "profile": {"first_name": "Anna", "last_name": "Petrova"}}),
            json!({"id": 2, "user_id": "u1", "date": "2024-01-01", "status": "ready",
                   "created_at": "2024-01-01T18:00:00Z", "calls_sellers": 12, "meetings_sellers": 3}),
            json!({"id": 3, "user_id": "u1", "date": "2024-01-07", "status": "set",
                   "created_at": "2024-01-07T10:00:00Z", "calls_sellers": 5}),
            json!({"id": 4, "user_id": "u2", "date": "2024-01-03", "status": "ready",
                   "created_at": "2024-01-03T10:00:00Z", "calls_sellers": 7, "calls_buyers": 4}),
            json!({"id": 5, "user_id": "u2", "date": "2023-12-20", "status": "ready",
                   "calls_sellers": 100}),
            json!({"id": 6, "date": "2024-01-02", "status": "set"}),
        ]
    }

    #[test]
    fn test_build_totals_and_roster() {
        let report = build_kpi_report(&rows(), "fixture", &request(None)).unwrap();

        assert_eq!(report.metadata.rows_fetched, 6);
        assert_eq!(report.metadata.canonical_reports, 3);
        assert_eq!(report.totals["calls_sellers"], 24);
        assert_eq!(report.totals["calls_buyers"], 4);
        assert!(report.selected.is_none());

        assert_eq!(report.roster.len(), 2);
        assert_eq!(report.roster[0].display_name.as_deref(), Some("Anna Petrova"));
        assert!(report.roster[0].unverified_today);
        assert!(report.roster[1].stale);

        assert!(matches!(
            report.warnings.as_slice(),
            [Anomaly::MalformedRecord { index: 5, .. }]
        ));
    }

    #[test]
    fn test_selected_agent_card() {
        let report = build_kpi_report(&rows(), "fixture", &request(Some("u1"))).unwrap();
        let card = report.selected.unwrap();

        assert_eq!(card.report_count, 2);
        assert_eq!(card.summary["calls_sellers"], 17);
        assert_eq!(card.seller_funnel[0].value, 17);
        assert_eq!(card.seller_funnel[1].value, 3);
        assert_eq!(card.seller_activity.len(), 7);
        assert_eq!(card.seller_activity[0].value, 12);
        assert_eq!(card.seller_activity[6].value, 5);
        assert_eq!(card.buyer_activity.len(), 7);
        assert!(card.buyer_activity.iter().all(|b| b.value == 0));
    }

    #[test]
    fn test_unknown_agent_gets_empty_card() {
        let report = build_kpi_report(&rows(), "fixture", &request(Some("nobody"))).unwrap();
        let card = report.selected.unwrap();

        assert_eq!(card.report_count, 0);
        assert!(card.display_name.is_none());
        assert!(card.summary.values().all(|v| *v == 0));
    }

    #[test]
    fn test_sample_export() {
        let rows: Vec<Value> =
            serde_json::from_str(include_str!("../../fixtures/reports.json")).unwrap();
        let mut req = request(Some("agent-1"));
        req.today = date("2024-03-14");
        req.range = DateRange::new(date("2024-03-08"), date("2024-03-14")).unwrap();

        let report = build_kpi_report(&rows, "fixtures/reports.json", &req).unwrap();

        assert_eq!(report.metadata.rows_fetched, 10);
        assert_eq!(report.metadata.canonical_reports, 5);
        assert_eq!(report.totals["calls_sellers"], 41);
        assert_eq!(report.totals["calls_buyers"], 19);
        assert_eq!(report.totals["sma_analytics"], 1);
        assert_eq!(report.totals["statuses"], 0);

        let names: Vec<_> = report
            .roster
            .iter()
            .map(|e| e.display_name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["Anna Petrova", "boris@example.com"]);
        assert!(report.roster[0].unverified_today && report.roster[0].unverified_earlier);
        assert!(report.roster[1].stale && !report.roster[1].reported_today);

        assert!(matches!(
            report.warnings.as_slice(),
            [
                Anomaly::CoercedMetric { index: 7, .. },
                Anomaly::CoercedMetric { index: 7, .. },
                Anomaly::MalformedRecord { index: 8, .. },
                Anomaly::MalformedRecord { index: 9, .. },
                Anomaly::DuplicateReady { count: 2, .. },
            ]
        ));

        let card = report.selected.unwrap();
        assert_eq!(card.report_count, 3);
        assert_eq!(card.summary["calls_sellers"], 36);
        assert_eq!(card.summary["sum_price_reduction"], 250_000);
        assert_eq!(card.seller_activity[3].value, 16);
        assert_eq!(card.buyer_activity[3].value, 7);

        req.policy = ReconcilePolicy {
            edit_supersedes_set: false,
        };
        let strict = build_kpi_report(&rows, "fixtures/reports.json", &req).unwrap();
        assert_eq!(strict.totals["calls_sellers"], 39);
    }

    #[test]
    fn test_zero_chart_bins_is_rejected() {
        let mut req = request(Some("u1"));
        req.chart_bins = 0;
        assert_eq!(
            build_kpi_report(&rows(), "fixture", &req).unwrap_err(),
            AggregateError::InvalidBinCount
        );
    }
}
