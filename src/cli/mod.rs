//! CLI module for llm-bench
//!
//! Provides the command-line interface with:
//!
//! - Multiple output formats (JSON, Human, CSV)
//! - Configuration file support with environment overrides
//! - Repeated runs with timing percentiles
//!
//! ## Usage
//!
//! ```bash
//! # Aggregate a batch into the dashboard JSON
//! llm-bench run --input samples.json --days 14
//!
//! # Summary table, hiding models flagged by the lifecycle classifier
//! llm-bench run --input samples.json --lifecycle lifecycle.json --hide-flagged --format human
//!
//! # Inspect the grid a window produces
//! llm-bench grid --days 30 --now 2024-05-01T12:00:00Z
//!
//! # Configuration management
//! llm-bench config --list
//! llm-bench config --set pipeline.default_days=14
//! ```
//!
//! ## Module Structure
//!
//! - `commands`: CLI command definitions using clap
//! - `output`: Output formatters for different formats
//! - `config`: Configuration file handling
//! - `inputs`: JSON input loaders

pub mod commands;
pub mod config;
pub mod inputs;
pub mod output;

// Re-exports for convenience
pub use commands::{Cli, CliAlignment, CliOutputFormat, Commands};
pub use config::{
    BenchConfig, ConfigError, DensitySection, DisplayConfig, OutputConfig, PipelineConfig,
    TableConfig,
};
pub use inputs::{load_lifecycle, load_samples, load_snapshots, InputError};
pub use output::{create_formatter, create_formatter_with_options, OutputFormat, OutputFormatter};
