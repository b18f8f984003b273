//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.kpidesk.toml` files.

use crate::analysis::ReconcilePolicy;
use crate::models::default_metric_keys;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".kpidesk.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Metric and reconciliation settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Report store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "kpi_report.md".to_string()
}

/// Metric selection and reconciliation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metric keys to total. Defaults to the full catalog.
    #[serde(default = "default_metric_keys")]
    pub keys: Vec<String>,

    /// Let a later `edit` replace the day's `set` report.
    #[serde(default = "default_true")]
    pub edit_supersedes_set: bool,

    /// Number of buckets on the activity chart.
    #[serde(default = "default_chart_bins")]
    pub chart_bins: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            keys: default_metric_keys(),
            edit_supersedes_set: true,
            chart_bins: default_chart_bins(),
        }
    }
}

impl MetricsConfig {
    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            edit_supersedes_set: self.edit_supersedes_set,
        }
    }
}

fn default_chart_bins() -> usize {
    7
}

/// Hosted report store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the hosted database API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Table holding daily reports.
    #[serde(default = "default_table")]
    pub table: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: default_table(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl StoreConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

fn default_table() -> String {
    "reports".to_string()
}

fn default_api_key_env() -> String {
    "KPIDESK_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the agent roster.
    #[serde(default = "default_true")]
    pub include_roster: bool,

    /// Include sales funnels for the selected agent.
    #[serde(default = "default_true")]
    pub include_funnel: bool,

    /// Include the activity chart table for the selected agent.
    #[serde(default = "default_true")]
    pub include_activity: bool,

    /// Include recovered data anomalies.
    #[serde(default = "default_true")]
    pub include_warnings: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_roster: true,
            include_funnel: true,
            include_activity: true,
            include_warnings: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.kpidesk.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(ref keys) = args.metrics {
            self.metrics.keys = keys.clone();
        }

        if args.strict_precedence {
            self.metrics.edit_supersedes_set = false;
        }

        if let Some(bins) = args.chart_bins {
            self.metrics.chart_bins = bins;
        }

        if let Some(ref url) = args.store_url {
            self.store.url = Some(url.clone());
        }

        if let Some(timeout) = args.timeout {
            self.store.timeout_seconds = timeout;
        }

        if args.no_roster {
            self.report.include_roster = false;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
