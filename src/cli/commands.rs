//! CLI command definitions for llm-bench
//!
//! Defines all CLI commands and arguments using clap derive macros.
//!
//! ## Commands
//!
//! - `run` - Aggregate a batch of samples into the dashboard projections
//! - `grid` - Print the timestamp grid for a day window
//! - `config` - Show or modify configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::lifecycle::LifecycleStatus;
use crate::projection::AlignmentPolicy;

// =============================================================================
// Main CLI
// =============================================================================

/// llm-bench - LLM benchmark aggregation
#[derive(Parser, Debug)]
#[command(name = "llm-bench")]
#[command(about = "Aggregate LLM benchmark samples into dashboard projections", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

// =============================================================================
// Commands
// =============================================================================

/// Time-series alignment selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliAlignment {
    /// Index-based resampling onto the grid
    #[default]
    Resample,
    /// Nearest sample within the configured tolerance
    #[value(alias = "nearest-timestamp")]
    Nearest,
}

impl CliAlignment {
    /// Resolve to a policy, using `tolerance_minutes` for nearest matching
    pub fn policy(self, tolerance_minutes: i64) -> AlignmentPolicy {
        match self {
            CliAlignment::Resample => AlignmentPolicy::Resample,
            CliAlignment::Nearest => AlignmentPolicy::NearestTimestamp {
                tolerance: chrono::Duration::minutes(tolerance_minutes),
            },
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate a JSON batch of samples
    Run {
        /// JSON array of raw samples
        #[arg(short, long)]
        input: PathBuf,

        /// Time-series window in days (defaults to config setting)
        #[arg(short, long)]
        days: Option<u32>,

        /// Reference time (RFC 3339); defaults to the current time
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,

        /// JSON display-name registry
        #[arg(long)]
        registry: Option<PathBuf>,

        /// JSON lifecycle annotations
        #[arg(long)]
        lifecycle: Option<PathBuf>,

        /// JSON snapshot profiles for deprecated models
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Keep only rows with these lifecycle statuses (repeatable)
        #[arg(long = "status", value_parser = parse_status)]
        statuses: Vec<LifecycleStatus>,

        /// Hide rows with a flagged lifecycle status
        #[arg(long)]
        hide_flagged: bool,

        /// Time-series alignment (defaults to config setting)
        #[arg(long, value_enum)]
        alignment: Option<CliAlignment>,

        /// Output format (defaults to config setting)
        #[arg(short, long, value_enum)]
        format: Option<CliOutputFormat>,

        /// Run the batch N times and report timing percentiles to stderr
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        repeat: Option<u32>,

        /// Write the timing report to a file (JSON for `.json`, markdown otherwise)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the timestamp grid for a day window
    Grid {
        /// Window in days
        #[arg(short, long)]
        days: u32,

        /// Reference time (RFC 3339); defaults to the current time
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },

    /// Show or modify configuration
    Config {
        /// Get a configuration value (e.g., pipeline.default_days)
        #[arg(long)]
        get: Option<String>,

        /// Set a configuration value (e.g., pipeline.default_days=14)
        #[arg(long)]
        set: Option<String>,

        /// List all configuration values
        #[arg(long)]
        list: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,

        /// Show configuration file path
        #[arg(long)]
        path: bool,
    },
}

/// Output format (CLI compatible)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    /// Full combined result as JSON
    #[default]
    Json,
    /// Colored summary table
    Human,
    /// Table rows as CSV
    Csv,
}

impl From<CliOutputFormat> for super::output::OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Json => super::output::OutputFormat::Json,
            CliOutputFormat::Human => super::output::OutputFormat::Human,
            CliOutputFormat::Csv => super::output::OutputFormat::Csv,
        }
    }
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn parse_status(value: &str) -> Result<LifecycleStatus, String> {
    value.parse()
}

// =============================================================================
// Tests
// =============================================================================
