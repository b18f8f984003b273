//! Markdown and JSON report generation.
//!
//! This module renders a [`KpiReport`] as a Markdown document for
//! administrators or as JSON for other tools.

use crate::config::ReportConfig;
use crate::error::Anomaly;
use crate::models::{
    metric_def, ActivityBin, FunnelStage, KpiReport, MetricKind, MetricSide, ReportMetadata,
    RosterEntry, Summary, UserKpi, METRIC_CATALOG,
};
use anyhow::Result;

/// Which sections to render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub sides: Vec<MetricSide>,
    pub include_roster: bool,
    pub include_funnel: bool,
    pub include_activity: bool,
    pub include_warnings: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&ReportConfig::default(), vec![MetricSide::Seller, MetricSide::Buyer])
    }
}

impl RenderOptions {
    pub fn from_config(config: &ReportConfig, sides: Vec<MetricSide>) -> Self {
        Self {
            sides,
            include_roster: config.include_roster,
            include_funnel: config.include_funnel,
            include_activity: config.include_activity,
            include_warnings: config.include_warnings,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &KpiReport, options: &RenderOptions) -> String {
    let mut output = String::new();

    output.push_str("# KPI Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));

    if let Some(ref selected) = report.selected {
        output.push_str(&generate_agent_section(selected, options));
    }

    output.push_str(&generate_totals_section(&report.totals, &options.sides));

    if options.include_roster {
        output.push_str(&generate_roster_section(&report.roster));
    }

    if options.include_warnings {
        output.push_str(&generate_warnings_section(&report.warnings));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!("- **Period:** {}\n", metadata.range));
    section.push_str(&format!("- **Today:** {}\n", metadata.today));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Rows Fetched:** {}\n", metadata.rows_fetched));
    section.push_str(&format!(
        "- **Canonical Reports:** {}\n",
        metadata.canonical_reports
    ));
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the KPI card for the selected agent.
fn generate_agent_section(agent: &UserKpi, options: &RenderOptions) -> String {
    let mut section = String::new();

    let name = agent.display_name.as_deref().unwrap_or(&agent.user_id);
    section.push_str(&format!("## Agent: {}\n\n", name));
    section.push_str(&format!(
        "*User ID: {} | Reports: {}*\n\n",
        agent.user_id, agent.report_count
    ));

    for side in &options.sides {
        section.push_str(&format!("### {} Metrics\n\n", side));
        section.push_str(&generate_metric_table(&agent.summary, *side));

        if options.include_funnel {
            let stages = match side {
                MetricSide::Seller => &agent.seller_funnel,
                MetricSide::Buyer => &agent.buyer_funnel,
            };
            section.push_str(&format!("### {} Funnel\n\n", side));
            section.push_str(&generate_funnel(stages));
        }

        let bins = match side {
            MetricSide::Seller => &agent.seller_activity,
            MetricSide::Buyer => &agent.buyer_activity,
        };
        if options.include_activity && !bins.is_empty() {
            section.push_str(&format!("### {} Activity\n\n", side));
            section.push_str(&generate_activity_table(bins));
        }
    }

    section
}

/// Generate agency-wide totals.
fn generate_totals_section(totals: &Summary, sides: &[MetricSide]) -> String {
    let mut section = String::new();

    section.push_str("## Agency Totals\n\n");
    for side in sides {
        section.push_str(&format!("### {}\n\n", side));
        section.push_str(&generate_metric_table(totals, *side));
    }

    let other: Vec<_> = totals
        .iter()
        .filter(|(key, _)| metric_def(key).is_none())
        .collect();
    if !other.is_empty() {
        section.push_str("### Other\n\n");
        section.push_str("| Metric | Total |\n");
        section.push_str("|:---|---:|\n");
        for (key, value) in other {
            section.push_str(&format!("| `{}` | {} |\n", key, value));
        }
        section.push('\n');
    }

    section
}

/// Metric table for one side, in catalog order.
fn generate_metric_table(summary: &Summary, side: MetricSide) -> String {
    let rows: Vec<_> = METRIC_CATALOG
        .iter()
        .filter(|m| m.side == side)
        .filter_map(|m| summary.get(m.key).map(|v| (m, *v)))
        .collect();

    if rows.is_empty() {
        return "No metrics selected.\n\n".to_string();
    }

    let mut table = String::new();
    table.push_str("| Metric | Total |\n");
    table.push_str("|:---|---:|\n");
    for (metric, value) in rows {
        let rendered = match metric.kind {
            MetricKind::Count => value.to_string(),
            MetricKind::Amount => format_amount(value),
        };
        table.push_str(&format!("| {} | {} |\n", metric.label, rendered));
    }
    table.push('\n');

    table
}

fn generate_funnel(stages: &[FunnelStage]) -> String {
    let chain = stages
        .iter()
        .map(|s| format!("{} **{}**", s.label, s.value))
        .collect::<Vec<_>>()
        .join(" → ");

    let mut block = format!("{}\n\n", chain);

    let conversions: Vec<_> = stages
        .iter()
        .filter_map(|s| s.conversion.map(|c| format!("{}: {:.0}%", s.label, c * 100.0)))
        .collect();
    if !conversions.is_empty() {
        block.push_str(&format!("*Conversion: {}*\n\n", conversions.join(", ")));
    }

    block
}

fn generate_activity_table(bins: &[ActivityBin]) -> String {
    let mut table = String::new();

    table.push_str("| Days | Calls |\n");
    table.push_str("|:---|---:|\n");
    for bin in bins {
        let days = if bin.start == bin.end {
            bin.start.format("%m.%d").to_string()
        } else {
            format!("{} – {}", bin.start.format("%m.%d"), bin.end.format("%m.%d"))
        };
        table.push_str(&format!("| {} | {} |\n", days, bin.value));
    }
    table.push('\n');

    table
}

/// Generate the roster section.
fn generate_roster_section(roster: &[RosterEntry]) -> String {
    let mut section = String::new();

    section.push_str("## Roster\n\n");

    if roster.is_empty() {
        section.push_str("No reports were filed in this period.\n\n");
        return section;
    }

    section.push_str("| Agent | Last Report | Reports | Status |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");

    for entry in roster {
        let name = entry.display_name.as_deref().unwrap_or(&entry.user_id);
        let last = entry
            .last_report_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let last = if entry.stale {
            format!("**{}**", last)
        } else {
            last
        };

        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            name,
            last,
            entry.report_count,
            roster_status(entry)
        ));
    }
    section.push('\n');

    section
}

fn roster_status(entry: &RosterEntry) -> String {
    let mut flags = Vec::new();
    if entry.unverified_today {
        flags.push("today awaiting review");
    }
    if entry.unverified_earlier {
        flags.push("earlier days awaiting review");
    }
    if !entry.reported_today {
        flags.push("no report today");
    }

    if flags.is_empty() {
        "verified".to_string()
    } else {
        flags.join("; ")
    }
}

/// Generate the warnings section.
fn generate_warnings_section(warnings: &[Anomaly]) -> String {
    if warnings.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Data Warnings\n\n");
    for warning in warnings {
        section.push_str(&format!("- {}\n", warning));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by KpiDesk*\n".to_string()
}

/// Thousands-separated amount, e.g. `1,250,000`.
fn format_amount(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// Generate a JSON report.
pub fn generate_json_report(report: &KpiReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
