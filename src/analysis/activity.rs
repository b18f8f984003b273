//! Activity chart bins and sales funnels.

use crate::error::AggregateError;
use crate::models::{metric_def, ActivityBin, DateRange, FunnelStage, MetricSide, Report, Summary};
use chrono::Days;

/// Seller funnel stages, in order.
pub const SELLER_FUNNEL: &[&str] = &[
    "calls_sellers",
    "meetings_sellers",
    "contracts_sellers",
    "price_reductions",
    "showings_sellers",
];

/// Buyer funnel stages, in order.
pub const BUYER_FUNNEL: &[&str] = &[
    "calls_buyers",
    "meetings_buyers",
    "contracts_buyers",
    "showings_buyers",
];

/// Metric plotted on the activity chart for each side.
pub fn chart_metric(side: MetricSide) -> &'static str {
    match side {
        MetricSide::Seller => "calls_sellers",
        MetricSide::Buyer => "calls_buyers",
    }
}

/// Split `range` into contiguous day buckets and sum `metric` per bucket.
///
/// Produces `min(parts, days in range)` buckets so none is empty of days.
/// Reports outside the range are ignored.
pub fn activity_bins(
    reports: &[Report],
    range: DateRange,
    metric: &str,
    parts: usize,
) -> Result<Vec<ActivityBin>, AggregateError> {
    if parts == 0 {
        return Err(AggregateError::InvalidBinCount);
    }

    let total_days = range.num_days() as u64;
    let bins = (parts as u64).min(total_days);
    let offset_date = |offset: u64| range.from() + Days::new(offset);

    let mut result: Vec<ActivityBin> = (0..bins)
        .map(|i| {
            let first = i * total_days / bins;
            let next = (i + 1) * total_days / bins;
            ActivityBin {
                start: offset_date(first),
                end: offset_date(next - 1),
                value: 0,
            }
        })
        .collect();

    for report in reports.iter().filter(|r| range.contains(r.date)) {
        if let Some(bin) = result
            .iter_mut()
            .find(|b| b.start <= report.date && report.date <= b.end)
        {
            bin.value = bin.value.saturating_add(report.metric(metric));
        }
    }

    Ok(result)
}

/// Build the sales funnel for one side from a summary.
pub fn funnel(summary: &Summary, side: MetricSide) -> Vec<FunnelStage> {
    let stages = match side {
        MetricSide::Seller => SELLER_FUNNEL,
        MetricSide::Buyer => BUYER_FUNNEL,
    };

    let mut previous: Option<u64> = None;
    stages
        .iter()
        .map(|key| {
            let value = summary.get(*key).copied().unwrap_or(0);
            let conversion = match previous {
                Some(prev) if prev > 0 => Some(value as f64 / prev as f64),
                _ => None,
            };
            previous = Some(value);

            FunnelStage {
                key: key.to_string(),
                label: metric_def(key)
                    .map(|m| m.label.to_string())
                    .unwrap_or_else(|| key.to_string()),
                value,
                conversion,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportStatus;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn create_test_report(day: &str, calls: u64) -> Report {
        Report {
            id: day.to_string(),
            user_id: "u1".to_string(),
            date: date(day),
            status: ReportStatus::Ready,
            created_at: None,
            metrics: [("calls_sellers".to_string(), calls)].into_iter().collect(),
        }
    }

    #[test]
    fn test_week_splits_into_daily_bins() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-07")).unwrap();
        let reports = vec![
            create_test_report("2024-01-01", 2),
            create_test_report("2024-01-03", 5),
            create_test_report("2024-01-07", 1),
            create_test_report("2024-01-08", 100),
        ];

        let bins = activity_bins(&reports, range, "calls_sellers", 7).unwrap();

        assert_eq!(bins.len(), 7);
        assert_eq!(bins[0].start, date("2024-01-01"));
        assert_eq!(bins[0].end, date("2024-01-01"));
        let values: Vec<_> = bins.iter().map(|b| b.value).collect();
        assert_eq!(values, vec![2, 0, 5, 0, 0, 0, 1]);
    }

    #[test]
    fn test_bins_cover_range_without_gaps() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();
        let bins = activity_bins(&[], range, "calls_sellers", 7).unwrap();

        assert_eq!(bins.len(), 7);
        assert_eq!(bins[0].start, range.from());
        assert_eq!(bins[6].end, range.to());
        for pair in bins.windows(2) {
            assert_eq!(pair[0].end.succ_opt(), Some(pair[1].start));
        }
    }

    #[test]
    fn test_short_range_uses_fewer_bins() {
        let range = DateRange::day(date("2024-01-01"));
        let reports = vec![create_test_report("2024-01-01", 4)];

        let bins = activity_bins(&reports, range, "calls_sellers", 7).unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].value, 4);

        assert_eq!(
            activity_bins(&reports, range, "calls_sellers", 0).unwrap_err(),
            AggregateError::InvalidBinCount
        );
    }

    #[test]
    fn test_seller_funnel_conversions() {
        let summary: Summary = [
            ("calls_sellers", 40),
            ("meetings_sellers", 10),
            ("contracts_sellers", 0),
            ("showings_sellers", 3),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let stages = funnel(&summary, MetricSide::Seller);

        assert_eq!(stages.len(), 5);
        assert_eq!(stages[0].conversion, None);
        assert_eq!(stages[1].conversion, Some(0.25));
        assert_eq!(stages[2].conversion, Some(0.0));
        assert_eq!(stages[3].value, 0);
        assert_eq!(stages[3].conversion, None);
        assert_eq!(stages[0].label, "Calls to sellers");
    }

    #[test]
    fn test_buyer_funnel_on_empty_summary() {
        let stages = funnel(&BTreeMap::new(), MetricSide::Buyer);
        assert_eq!(stages.len(), 4);
        assert!(stages.iter().all(|s| s.value == 0 && s.conversion.is_none()));
        assert_eq!(chart_metric(MetricSide::Buyer), "calls_buyers");
    }
}
