//! Hosted report table, queried over its PostgREST-style HTTP API.

use crate::store::ReportQuery;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Columns requested for each row, including the joined agent profile.
const SELECT_COLUMNS: &str = "*,profile:user_id(id,email,first_name,last_name)";

/// Client for the hosted report table.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: String,
    table: String,
    api_key: Option<String>,
    timeout_seconds: u64,
    show_progress: bool,
}

impl RemoteStore {
    pub fn new(base_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            table: table.into(),
            api_key: None,
            timeout_seconds: 30,
            show_progress: false,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the table URL with filters for `query`.
    pub fn request_url(&self, query: &ReportQuery) -> Result<Url> {
        let endpoint = format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        );
        let mut url = Url::parse(&endpoint)
            .with_context(|| format!("Invalid report store URL: {}", endpoint))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("select", SELECT_COLUMNS)
                .append_pair("date", &format!("gte.{}", query.range.from()))
                .append_pair("date", &format!("lte.{}", query.range.to()));
            if let Some(ref user_id) = query.user_id {
                pairs.append_pair("user_id", &format!("eq.{}", user_id));
            }
            pairs.append_pair("order", "date.desc");
        }

        Ok(url)
    }

    /// Fetch rows matching `query`.
    pub async fn fetch(&self, query: &ReportQuery) -> Result<Vec<Value>> {
        let url = self.request_url(query)?;
        info!("Fetching reports from {}", self.base_url);
        debug!("Request URL: {}", url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let mut request = client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let spinner = self.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.set_message("Fetching reports...");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!("Request timed out after {}s", self.timeout_seconds)
            } else if e.is_connect() {
                anyhow::anyhow!("Cannot connect to report store at {}", self.base_url)
            } else {
                anyhow::anyhow!("Failed to send request: {}", e)
            }
        });

        let result = match response {
            Ok(response) => read_rows(response).await,
            Err(e) => Err(e),
        };

        if let Some(pb) = spinner {
            match &result {
                Ok(rows) => pb.finish_with_message(format!("Fetched {} rows", rows.len())),
                Err(_) => pb.abandon_with_message("Fetch failed"),
            }
        }

        result
    }
}

async fn read_rows(response: reqwest::Response) -> Result<Vec<Value>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("Report store error {}: {}", status, body));
    }

    let payload: Value = response
        .json()
        .await
        .context("Failed to parse report store response")?;

    match payload {
        Value::Array(rows) => Ok(rows),
        other => Err(anyhow::anyhow!(
            "Report store returned {} instead of a list of rows",
            match other {
                Value::Object(_) => "an object",
                _ => "a scalar",
            }
        )),
    }
}
