//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::error::AggregateError;
use crate::models::{DateRange, MetricSide, Period};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// KpiDesk - daily activity reports and KPI summaries for agencies
///
/// Reconciles agents' daily reports (set / edit / ready / trash) into one
/// report per agent and day, then totals the metrics into KPI summaries,
/// sales funnels and an administrator roster.
///
/// Examples:
///   kpidesk --input exports/reports.json
///   kpidesk --input exports/ --user 42 --period month
///   kpidesk --store-url https://db.example.com --from 2024-01-01 --to 2024-01-31
///   kpidesk --input exports/ --format json --output -
///   kpidesk --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Exported report rows: a .json array, a .jsonl file, or a directory
    ///
    /// Takes priority over --store-url.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Base URL of the hosted report store
    ///
    /// The API key is read from the environment variable named in the
    /// config (KPIDESK_API_KEY by default).
    #[arg(long, value_name = "URL", env = "KPIDESK_STORE_URL")]
    pub store_url: Option<String>,

    /// Agent to build the KPI card for
    ///
    /// Without it, only the roster and agency-wide totals are produced.
    #[arg(short, long, value_name = "USER_ID")]
    pub user: Option<String>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    pub from: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD), defaults to today
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    pub to: Option<NaiveDate>,

    /// Reporting period ending today (used when --from/--to are absent)
    #[arg(short, long, value_name = "PERIOD", conflicts_with_all = ["from", "to"])]
    pub period: Option<PeriodArg>,

    /// Day treated as today (YYYY-MM-DD), defaults to the local date
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    pub today: Option<NaiveDate>,

    /// Which side of the funnel to show
    #[arg(long, default_value = "both", value_name = "SIDE")]
    pub side: SideArg,

    /// Output file path for the report ("-" for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Metric keys to total (comma-separated)
    ///
    /// Example: --metrics calls_sellers,meetings_sellers
    #[arg(long, value_name = "KEYS", value_delimiter = ',')]
    pub metrics: Option<Vec<String>>,

    /// Prefer the day's set report over any later edit
    #[arg(long)]
    pub strict_precedence: bool,

    /// Number of activity chart buckets
    #[arg(long, value_name = "COUNT")]
    pub chart_bins: Option<usize>,

    /// Report store request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Leave the roster out of the report
    #[arg(long)]
    pub no_roster: bool,

    /// Exit with code 2 if any agent has reports awaiting review
    #[arg(long)]
    pub fail_on_unverified: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .kpidesk.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .kpidesk.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Reporting period presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PeriodArg {
    Today,
    Yesterday,
    Week,
    Month,
    HalfYear,
    Year,
    All,
}

impl From<PeriodArg> for Period {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Today => Period::Today,
            PeriodArg::Yesterday => Period::Yesterday,
            PeriodArg::Week => Period::Week,
            PeriodArg::Month => Period::Month,
            PeriodArg::HalfYear => Period::HalfYear,
            PeriodArg::Year => Period::Year,
            PeriodArg::All => Period::All,
        }
    }
}

/// Funnel side selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SideArg {
    Seller,
    Buyer,
    #[default]
    Both,
}

impl SideArg {
    pub fn sides(&self) -> Vec<MetricSide> {
        match self {
            SideArg::Seller => vec![MetricSide::Seller],
            SideArg::Buyer => vec![MetricSide::Buyer],
            SideArg::Both => vec![MetricSide::Seller, MetricSide::Buyer],
        }
    }
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a date in YYYY-MM-DD form", s))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(format!("--from {} is after --to {}", from, to));
            }
        }

        if let Some(ref url) = self.store_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Store URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref input) = self.input {
            if !input.exists() {
                return Err(format!("Input path does not exist: {}", input.display()));
            }
        }

        if let Some(ref keys) = self.metrics {
            if keys.iter().any(|k| k.trim().is_empty()) {
                return Err("Metric keys must not be empty".to_string());
            }
        }

        if self.chart_bins == Some(0) {
            return Err("Chart bins must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Resolve the requested date range against `today`.
    ///
    /// Explicit --from/--to win; a lone --from runs to today and a lone
    /// --to covers that single day. Otherwise the period applies, a week
    /// by default.
    pub fn resolve_range(&self, today: NaiveDate) -> Result<DateRange, AggregateError> {
        match (self.from, self.to) {
            (None, None) => Ok(Period::from(self.period.unwrap_or(PeriodArg::Week)).range(today)),
            (from, to) => {
                let to = to.unwrap_or(today);
                DateRange::new(from.unwrap_or(to), to)
            }
        }
    }

    /// Whether the report goes to stdout.
    pub fn writes_to_stdout(&self) -> bool {
        self.output.as_deref() == Some(std::path::Path::new("-"))
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general] verbose`; `--quiet` overrides it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: None,
            store_url: None,
            user: None,
            from: None,
            to: None,
            period: None,
            today: None,
            side: SideArg::Both,
            output: None,
            format: OutputFormat::Markdown,
            metrics: None,
            strict_precedence: false,
            chart_bins: None,
            timeout: None,
            no_roster: false,
            fail_on_unverified: false,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "kpidesk",
            "--store-url",
            "https://db.example.com",
            "--user",
            "42",
            "--period",
            "half-year",
            "--metrics",
            "calls_sellers,stickers",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.user.as_deref(), Some("42"));
        assert_eq!(args.period, Some(PeriodArg::HalfYear));
        assert_eq!(
            args.metrics,
            Some(vec!["calls_sellers".to_string(), "stickers".to_string()])
        );
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_period_conflicts_with_dates() {
        let result = Args::try_parse_from([
            "kpidesk",
            "--period",
            "week",
            "--from",
            "2024-01-01",
        ]);
        assert!(result.is_err());

        assert!(Args::try_parse_from(["kpidesk", "--from", "01.01.2024"]).is_err());
    }

    #[test]
    fn test_validation_inverted_range() {
        let mut args = make_args();
        args.from = Some(date("2024-02-01"));
        args.to = Some(date("2024-01-01"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_store_url() {
        let mut args = make_args();
        args.store_url = Some("db.example.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.chart_bins = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_resolve_range() {
        let today = date("2024-03-15");
        let mut args = make_args();

        let week = args.resolve_range(today).unwrap();
        assert_eq!(week.from(), date("2024-03-08"));
        assert_eq!(week.to(), today);

        args.from = Some(date("2024-03-01"));
        assert_eq!(
            args.resolve_range(today).unwrap(),
            DateRange::new(date("2024-03-01"), today).unwrap()
        );

        args.from = None;
        args.to = Some(date("2024-03-10"));
        assert_eq!(
            args.resolve_range(today).unwrap(),
            DateRange::day(date("2024-03-10"))
        );

        args.from = Some(date("2024-03-20"));
        assert!(args.resolve_range(today).is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_stdout_output() {
        let mut args = make_args();
        assert!(!args.writes_to_stdout());
        args.output = Some(PathBuf::from("-"));
        assert!(args.writes_to_stdout());
    }
}
