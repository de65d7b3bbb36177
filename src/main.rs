//! llm-bench CLI - LLM benchmark aggregation
//!
//! A command-line interface over the aggregation pipeline with:
//! - JSON, human and CSV output
//! - Registry-backed display names with static fallback
//! - Lifecycle filtering and snapshot splits
//! - Repeated runs with timing percentiles

use std::collections::HashSet;
use std::io::{stdout, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_bench_pipeline::cli::{
    create_formatter_with_options, load_lifecycle, load_samples, load_snapshots, BenchConfig,
    Cli, CliAlignment, CliOutputFormat, Commands, OutputFormat,
};
use llm_bench_pipeline::display::{
    DisplayMapper, JsonFileRegistry, RegistryCache, RegistryDisplayMapper,
};
use llm_bench_pipeline::instrumentation::RepeatReport;
use llm_bench_pipeline::lifecycle::LifecycleStatus;
use llm_bench_pipeline::projection::build_grid;
use llm_bench_pipeline::{ManualClock, Pipeline, PipelineOptions};

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path_override = cli.config.clone();

    // Quiet by default - only show errors unless explicitly verbose
    let filter = if cli.verbose { "debug" } else { "error" };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    // Load configuration, then let the environment override it
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load_from(path.clone()),
        None => BenchConfig::load(),
    };
    config.apply_env();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            input,
            days,
            now,
            registry,
            lifecycle,
            snapshots,
            statuses,
            hide_flagged,
            alignment,
            format,
            repeat,
            report,
        } => {
            let request = RunRequest {
                input,
                days,
                now,
                registry,
                lifecycle,
                snapshots,
                statuses,
                hide_flagged,
                alignment,
                format,
                repeat: repeat.unwrap_or(1),
                report,
                quiet: cli.quiet,
            };
            handle_run(request, &config).await?;
        }

        Commands::Grid { days, now } => {
            handle_grid(days, now, &config)?;
        }

        Commands::Config {
            get,
            set,
            list,
            reset,
            path,
        } => {
            handle_config(get, set, list, reset, path, config_path_override)?;
        }
    }

    Ok(())
}

// =============================================================================
// Run Handler
// =============================================================================

/// Flags of the `run` command
struct RunRequest {
    input: PathBuf,
    days: Option<u32>,
    now: Option<DateTime<Utc>>,
    registry: Option<PathBuf>,
    lifecycle: Option<PathBuf>,
    snapshots: Option<PathBuf>,
    statuses: Vec<LifecycleStatus>,
    hide_flagged: bool,
    alignment: Option<CliAlignment>,
    format: Option<CliOutputFormat>,
    repeat: u32,
    report: Option<PathBuf>,
    quiet: bool,
}

async fn handle_run(request: RunRequest, config: &BenchConfig) -> anyhow::Result<()> {
    let samples = load_samples(&request.input)
        .await
        .context("Failed to load samples")?;

    // Flags override config
    let mut filter = config.table_filter()?;
    if !request.statuses.is_empty() {
        filter.allowed_statuses = Some(request.statuses.iter().copied().collect::<HashSet<_>>());
    }
    filter.hide_flagged |= request.hide_flagged;

    let alignment = match request.alignment {
        Some(alignment) => alignment.policy(config.pipeline.nearest_tolerance_minutes),
        None => config.alignment_policy(),
    };

    let options = PipelineOptions {
        days: config.effective_days(request.days),
        alignment,
        filter,
        density: config.density_config(),
    };

    let mapper: Arc<dyn DisplayMapper> =
        match request.registry.or_else(|| config.display.registry_path.clone()) {
            Some(path) => {
                tracing::debug!("Resolving display names through registry {:?}", path);
                let cache = RegistryCache::new(
                    Arc::new(JsonFileRegistry::new(path)),
                    config.registry_cache_config(),
                );
                Arc::new(RegistryDisplayMapper::new(
                    Arc::new(cache),
                    config.static_table(),
                ))
            }
            None => Arc::new(config.static_table()),
        };

    let mut pipeline = Pipeline::new(mapper)
        .with_aliases(config.provider_aliases())
        .with_options(options);

    if let Some(path) = &request.lifecycle {
        let index = load_lifecycle(path)
            .await
            .context("Failed to load lifecycle annotations")?;
        pipeline = pipeline.with_lifecycle(index);
    }
    if let Some(path) = &request.snapshots {
        let source = load_snapshots(path)
            .await
            .context("Failed to load snapshot profiles")?;
        pipeline = pipeline.with_snapshots(Arc::new(source));
    }
    if let Some(now) = request.now {
        pipeline = pipeline.with_clock(Arc::new(ManualClock::new(now)));
    }

    let mut timings = Vec::with_capacity(request.repeat as usize);
    let mut last_run = None;
    for _ in 0..request.repeat {
        let run = pipeline
            .run_with_timeout(&samples, config.timeout())
            .await
            .context("Pipeline run failed")?;
        timings.push(run.metrics.clone());
        last_run = Some(run);
    }
    let Some(run) = last_run else {
        return Ok(());
    };

    tracing::info!(
        "Aggregated {} samples into {} rows in {}us",
        run.ingest.accepted,
        run.result.table.len(),
        run.metrics.total_us
    );

    if !request.quiet && run.ingest.dropped() > 0 {
        eprintln!(
            "Dropped {} of {} samples ({} missing identity, {} invalid throughput, {} missing timestamp)",
            run.ingest.dropped(),
            run.ingest.received,
            run.ingest.dropped_missing_identity,
            run.ingest.dropped_invalid_throughput,
            run.ingest.dropped_missing_timestamp
        );
    }

    let format = resolve_format(request.format, config);
    let use_color = config.output.color && stdout().is_terminal();
    let formatter = create_formatter_with_options(format, use_color, config.output.pretty);

    let mut out = stdout().lock();
    formatter.format_result(&run.result, &mut out)?;
    out.flush()?;

    let timing = RepeatReport::from_runs(&timings);
    if let Some(path) = &request.report {
        timing
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Wrote timing report to {:?}", path);
    }
    if request.repeat > 1 && !request.quiet {
        eprintln!("{}", timing.to_markdown());
    }

    Ok(())
}

fn resolve_format(flag: Option<CliOutputFormat>, config: &BenchConfig) -> OutputFormat {
    if let Some(format) = flag {
        return format.into();
    }
    config
        .output
        .default_format
        .parse()
        .unwrap_or_else(|e: String| {
            tracing::warn!("{}; falling back to json", e);
            OutputFormat::Json
        })
}

// =============================================================================
// Grid Handler
// =============================================================================

fn handle_grid(days: u32, now: Option<DateTime<Utc>>, config: &BenchConfig) -> anyhow::Result<()> {
    let days = config.effective_days(Some(days));
    let grid = build_grid(days, now.unwrap_or_else(Utc::now))?;

    let format = resolve_format(None, config);
    let use_color = config.output.color && stdout().is_terminal();
    let formatter = create_formatter_with_options(format, use_color, config.output.pretty);

    let mut out = stdout().lock();
    formatter.format_grid(&grid, &mut out)?;
    out.flush()?;
    Ok(())
}

// =============================================================================
// Config Handler
// =============================================================================

fn handle_config(
    get: Option<String>,
    set: Option<String>,
    list: bool,
    reset: bool,
    path: bool,
    config_path_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config_path = config_path_override.unwrap_or_else(BenchConfig::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if reset {
        let default_cfg = BenchConfig::default();
        default_cfg
            .save_to(config_path.clone())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Configuration reset to defaults.");
        println!("Saved to: {}", config_path.display());
        return Ok(());
    }

    // Edits apply to the file alone, without environment overrides
    let mut config = BenchConfig::load_from(config_path.clone());

    if let Some(key) = get {
        match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown configuration key: {}", key),
        }
        return Ok(());
    }

    if let Some(kv) = set {
        let Some((key, value)) = kv.split_once('=') else {
            anyhow::bail!("Invalid format. Use: --set key=value");
        };

        config.set(key, value)?;
        config
            .save_to(config_path.clone())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Set {} = {}", key, value);
        return Ok(());
    }

    if list {
        println!("Current configuration:");
        println!();
        for (key, value) in config.list() {
            println!("  {} = {}", key, value);
        }
        println!();
        println!("Config file: {}", config_path.display());
        return Ok(());
    }

    // Default: show usage
    println!("Configuration commands:");
    println!("  llm-bench config --list            Show all settings");
    println!("  llm-bench config --get <key>       Get a setting");
    println!("  llm-bench config --set <key>=<val> Set a setting");
    println!("  llm-bench config --reset           Reset to defaults");
    println!("  llm-bench config --path            Show config file path");

    Ok(())
}
