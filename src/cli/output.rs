//! Output formatters for llm-bench CLI
//!
//! Provides multiple output formats for different use cases:
//!
//! - **JSON**: The full combined result, for dashboards and jq
//! - **Human**: Colored summary table for terminal use
//! - **CSV**: Table rows for spreadsheets
//!
//! ## Example
//!
//! ```rust,no_run
//! use llm_bench_pipeline::cli::output::{create_formatter, OutputFormat};
//! use llm_bench_pipeline::projection::build_grid;
//!
//! let grid = build_grid(7, chrono::Utc::now()).unwrap();
//! let formatter = create_formatter(OutputFormat::Json, false);
//! let mut stdout = std::io::stdout();
//! formatter.format_grid(&grid, &mut stdout).unwrap();
//! ```

use std::io::{self, Write};

use crate::lifecycle::LifecycleStatus;
use crate::pipeline::CombinedResult;
use crate::projection::{TableRow, TimestampGrid};

// =============================================================================
// Output Format Enum
// =============================================================================

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON output for scripting
    #[default]
    Json,
    /// Human-readable output with optional colors
    Human,
    /// CSV output for spreadsheets
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "table" => Ok(OutputFormat::Human),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// =============================================================================
// Formatter Trait
// =============================================================================

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    /// Format the result of a pipeline run
    fn format_result(&self, result: &CombinedResult, writer: &mut dyn Write) -> io::Result<()>;

    /// Format a bare timestamp grid
    fn format_grid(&self, grid: &TimestampGrid, writer: &mut dyn Write) -> io::Result<()>;

    /// Format an error message
    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()>;
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// JSON output formatter
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn write_value<T: serde::Serialize>(&self, value: &T, writer: &mut dyn Write) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, value)?;
        } else {
            serde_json::to_writer(&mut *writer, value)?;
        }
        writeln!(writer)
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_result(&self, result: &CombinedResult, writer: &mut dyn Write) -> io::Result<()> {
        self.write_value(result, writer)
    }

    fn format_grid(&self, grid: &TimestampGrid, writer: &mut dyn Write) -> io::Result<()> {
        self.write_value(grid, writer)
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        self.write_value(&serde_json::json!({ "error": error }), writer)
    }
}

// =============================================================================
// Human Formatter
// =============================================================================

/// Human-readable output formatter
pub struct HumanFormatter {
    use_color: bool,
}

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color_code: &str) -> String {
        if self.use_color {
            format!("\x1b[{}m{}\x1b[0m", color_code, text)
        } else {
            text.to_string()
        }
    }

    fn format_status(&self, row: &TableRow) -> String {
        let status = row.lifecycle_status.unwrap_or(if row.deprecated {
            LifecycleStatus::Deprecated
        } else {
            LifecycleStatus::Active
        });
        let label = format!("{:<17}", status.as_str());
        let color = match status {
            LifecycleStatus::Active => "32", // Green
            LifecycleStatus::Stale => "33",  // Yellow
            _ => "31",                       // Red
        };
        self.colorize(&label, color)
    }
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl OutputFormatter for HumanFormatter {
    fn format_result(&self, result: &CombinedResult, writer: &mut dyn Write) -> io::Result<()> {
        if result.table.is_empty() {
            writeln!(writer, "{}", self.colorize("No benchmarks to show.", "33"))?;
            return Ok(());
        }

        let header = self.colorize(
            &format!(
                "{} benchmarks over {} grid points:",
                result.table.len(),
                result.time_series.timestamps.len()
            ),
            "1;36", // Bold cyan
        );
        writeln!(writer, "{}", header)?;
        writeln!(writer)?;

        let columns = format!(
            "  {:<12} {:<28} {:>9} {:>9} {:>9} {:>8}  {:<17}",
            "PROVIDER", "MODEL", "TOK/S", "MIN", "MAX", "TTFT", "STATUS"
        );
        writeln!(writer, "{}", self.colorize(&columns, "1"))?;

        for row in &result.table {
            writeln!(
                writer,
                "  {:<12} {:<28} {:>9} {:>9} {:>9} {:>8}  {}",
                row.provider,
                row.display_name,
                row.tokens_per_second_mean,
                row.tokens_per_second_min,
                row.tokens_per_second_max,
                format_number(row.time_to_first_token_mean),
                self.format_status(row),
            )?;
        }

        if let (Some(first), Some(last)) = (
            result.time_series.timestamps.first(),
            result.time_series.timestamps.last(),
        ) {
            writeln!(writer)?;
            writeln!(
                writer,
                "{}",
                self.colorize(&format!("Window: {} .. {}", first, last), "90")
            )?;
        }
        Ok(())
    }

    fn format_grid(&self, grid: &TimestampGrid, writer: &mut dyn Write) -> io::Result<()> {
        let header = self.colorize(
            &format!(
                "{} points, {} minute step:",
                grid.len(),
                grid.step().num_minutes()
            ),
            "1;36",
        );
        writeln!(writer, "{}", header)?;
        for timestamp in grid.iso_strings() {
            writeln!(writer, "  {}", timestamp)?;
        }
        Ok(())
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{} {}", self.colorize("Error:", "1;31"), error)
    }
}

// =============================================================================
// CSV Formatter
// =============================================================================

const CSV_HEADER: &str = "provider,providerCanonical,providerSlug,model_name,modelCanonical,modelSlug,display_name,tokens_per_second_mean,tokens_per_second_min,tokens_per_second_max,time_to_first_token_mean,lifecycle_status,deprecated,last_benchmark_at";

/// CSV output formatter (table rows only)
pub struct CsvFormatter;

impl OutputFormatter for CsvFormatter {
    fn format_result(&self, result: &CombinedResult, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{}", CSV_HEADER)?;
        for row in &result.table {
            let fields = [
                escape_csv(&row.provider),
                escape_csv(&row.provider_canonical),
                escape_csv(&row.provider_slug),
                escape_csv(&row.model_name),
                escape_csv(&row.model_canonical),
                escape_csv(&row.model_slug),
                escape_csv(&row.display_name),
                row.tokens_per_second_mean.to_string(),
                row.tokens_per_second_min.to_string(),
                row.tokens_per_second_max.to_string(),
                row.time_to_first_token_mean
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                row.lifecycle_status
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                row.deprecated.to_string(),
                row.last_benchmark_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            ];
            writeln!(writer, "{}", fields.join(","))?;
        }
        Ok(())
    }

    fn format_grid(&self, grid: &TimestampGrid, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "timestamp")?;
        for timestamp in grid.iso_strings() {
            writeln!(writer, "{}", timestamp)?;
        }
        Ok(())
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        // CSV comment
        writeln!(writer, "# Error: {}", error)
    }
}

/// Escape a string for CSV output
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// =============================================================================
// Factory Function
// =============================================================================

/// Create a formatter for the given output format
pub fn create_formatter(format: OutputFormat, use_color: bool) -> Box<dyn OutputFormatter> {
    create_formatter_with_options(format, use_color, true)
}

/// Create a formatter with JSON pretty-printing control
pub fn create_formatter_with_options(
    format: OutputFormat,
    use_color: bool,
    pretty: bool,
) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter::new(pretty)),
        OutputFormat::Human => Box::new(HumanFormatter::new(use_color)),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

// =============================================================================
// Tests
// =============================================================================
