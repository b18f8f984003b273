//! KpiDesk - daily activity report KPIs for real-estate agencies
//!
//! A CLI tool that reconciles agents' daily reports into one canonical
//! report per agent and day and renders KPI totals, funnels and an
//! administrator roster.
//!
//! Exit codes:
//!   0 - Success (or no --fail-on-unverified set)
//!   1 - Runtime error (unreadable export, store failure, bad config, etc.)
//!   2 - Reports awaiting review with --fail-on-unverified

use anyhow::{Context, Result};
use kpidesk::analysis::{build_kpi_report, KpiRequest};
use kpidesk::cli::{Args, OutputFormat};
use kpidesk::config::{Config, CONFIG_FILE};
use kpidesk::report::{self, RenderOptions};
use kpidesk::store::{FileStore, RemoteStore, ReportQuery, ReportSource};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `[general] verbose` can set the log level
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("KpiDesk v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .kpidesk.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose metrics, the report store and report sections.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    // Logs go to stderr so `--output -` keeps stdout clean.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Fetch, reconcile and render. Returns the exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let to_stdout = args.writes_to_stdout();
    let chatty = !args.quiet && !to_stdout;

    let today = args
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let range = args.resolve_range(today)?;
    info!("Reporting on {} (today is {})", range, today);

    // Step 1: Pick the report source
    let source = report_source(&args, &config, chatty)?;
    if chatty {
        println!("📥 Reading reports from {}", source.describe());
    }

    // The roster needs every agent; only narrow the query when it is off.
    let query = ReportQuery {
        user_id: if config.report.include_roster {
            None
        } else {
            args.user.clone()
        },
        range,
    };

    // Step 2: Fetch raw rows
    let rows = source.fetch(&query).await?;
    info!("Fetched {} rows", rows.len());

    // Step 3: Reconcile and aggregate
    let sides = args.side.sides();
    let request = KpiRequest {
        today,
        range,
        user_id: args.user.clone(),
        metric_keys: config.metrics.keys.clone(),
        policy: config.metrics.policy(),
        chart_bins: config.metrics.chart_bins,
    };

    let mut kpi = build_kpi_report(&rows, source.describe(), &request)?;
    let duration = start_time.elapsed().as_secs_f64();
    kpi.metadata.duration_seconds = duration;

    for warning in &kpi.warnings {
        warn!("{}", warning);
    }

    // Step 4: Render and write
    let options = RenderOptions::from_config(&config.report, sides);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&kpi)?,
        OutputFormat::Markdown => report::generate_markdown_report(&kpi, &options),
    };

    if to_stdout {
        print!("{}", output);
    } else {
        std::fs::write(&config.general.output, &output)
            .with_context(|| format!("Failed to write report to {}", config.general.output))?;
    }

    let unverified: Vec<_> = kpi.roster.iter().filter(|e| e.is_unverified()).collect();

    if chatty {
        println!("\n📊 Summary:");
        println!("   Period: {}", range);
        println!("   Rows fetched: {}", kpi.metadata.rows_fetched);
        println!("   Canonical reports: {}", kpi.metadata.canonical_reports);
        println!("   Agents: {}", kpi.roster.len());
        println!("   Awaiting review: {}", unverified.len());
        if !kpi.warnings.is_empty() {
            println!("   ⚠️  Data warnings: {}", kpi.warnings.len());
        }
        println!("   Duration: {:.2}s", duration);
        println!("\n✅ Report saved to: {}", config.general.output);
    }

    if args.fail_on_unverified && !unverified.is_empty() {
        eprintln!(
            "\n⛔ {} agent(s) have reports awaiting review. Failing (exit code 2).",
            unverified.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Local export first, then the hosted store.
fn report_source(args: &Args, config: &Config, show_progress: bool) -> Result<ReportSource> {
    if let Some(ref input) = args.input {
        info!("Using local export: {}", input.display());
        return Ok(ReportSource::File(FileStore::new(input.clone())));
    }

    let Some(ref url) = config.store.url else {
        anyhow::bail!(
            "No report source: pass --input, --store-url, or set [store] url in {}",
            CONFIG_FILE
        );
    };

    let api_key = config.store.api_key();
    if api_key.is_none() {
        warn!(
            "{} is not set; querying the report store without an API key",
            config.store.api_key_env
        );
    }

    Ok(ReportSource::Remote(
        RemoteStore::new(url.clone(), config.store.table.clone())
            .with_api_key(api_key)
            .with_timeout(config.store.timeout_seconds)
            .with_progress(show_progress),
    ))
}

/// Where the configuration came from, logged once logging is up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigOrigin::Builtin => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigOrigin::DefaultFile),
        Ok(None) => (Config::default(), ConfigOrigin::Builtin),
        Err(e) => (Config::default(), ConfigOrigin::Unreadable(e)),
    })
}
