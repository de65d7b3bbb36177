//! Summary report over repeated pipeline runs

use super::metrics::{calculate_percentiles, CountMetrics, LatencyPercentiles, PipelineMetrics};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Percentile summary of `--repeat` runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatReport {
    /// Report generation timestamp
    pub generated_at: String,
    pub runs: usize,
    /// Total run time percentiles
    pub total: LatencyPercentiles,
    pub stages: StageBreakdown,
    /// Counts of the last run (identical across runs of the same input)
    pub counts: CountMetrics,
}

/// Percentiles per pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageBreakdown {
    pub canonicalize: LatencyPercentiles,
    pub resolve: LatencyPercentiles,
    pub merge: LatencyPercentiles,
    pub time_series: LatencyPercentiles,
    pub density: LatencyPercentiles,
    pub table: LatencyPercentiles,
}

impl RepeatReport {
    pub fn from_runs(runs: &[PipelineMetrics]) -> Self {
        let collect = |f: fn(&PipelineMetrics) -> u64| -> LatencyPercentiles {
            let mut values: Vec<u64> = runs.iter().map(f).collect();
            calculate_percentiles(&mut values)
        };

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            runs: runs.len(),
            total: collect(|r| r.total_us),
            stages: StageBreakdown {
                canonicalize: collect(|r| r.stages.canonicalize_us),
                resolve: collect(|r| r.stages.resolve_us),
                merge: collect(|r| r.stages.merge_us),
                time_series: collect(|r| r.stages.time_series_us),
                density: collect(|r| r.stages.density_us),
                table: collect(|r| r.stages.table_us),
            },
            counts: runs.last().map(|r| r.counts.clone()).unwrap_or_default(),
        }
    }

    /// Export as markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Pipeline timing\n\n");
        md.push_str(&format!("**Generated:** {}\n\n", self.generated_at));
        md.push_str(&format!("**Runs:** {}\n\n", self.runs));

        md.push_str("## Stages\n\n");
        md.push_str("| Stage | P50 | P95 | P99 |\n");
        md.push_str("|-------|-----|-----|-----|\n");
        let rows = [
            ("Canonicalize", &self.stages.canonicalize),
            ("Resolve", &self.stages.resolve),
            ("Merge", &self.stages.merge),
            ("Time series", &self.stages.time_series),
            ("Density", &self.stages.density),
            ("Table", &self.stages.table),
            ("Total", &self.total),
        ];
        for (name, p) in rows {
            md.push_str(&format!(
                "| {} | {}us | {}us | {}us |\n",
                name, p.p50_us, p.p95_us, p.p99_us
            ));
        }
        md.push('\n');

        md.push_str("## Dataset\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Samples received | {} |\n", self.counts.samples_received));
        md.push_str(&format!("| Samples dropped | {} |\n", self.counts.samples_dropped));
        md.push_str(&format!("| Canonical groups | {} |\n", self.counts.canonical_groups));
        md.push_str(&format!("| Merged benchmarks | {} |\n", self.counts.merged_benchmarks));
        md.push_str(&format!("| Visible benchmarks | {} |\n", self.counts.visible_benchmarks));
        md.push_str(&format!("| Grid points | {} |\n", self.counts.grid_points));

        md
    }

    /// Save the report to a file: JSON for a `.json` path, markdown otherwise
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let body = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_markdown(),
        };
        let mut file = std::fs::File::create(path)?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
