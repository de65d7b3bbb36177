//! Gaussian kernel density estimates of throughput

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::rounding::round3;
use crate::display::MergedBenchmark;

/// KDE parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityConfig {
    /// Kernel bandwidth `h`, in tokens/s
    pub bandwidth: f64,
    /// Samples above this are left out of the curve
    pub display_ceiling: f64,
    /// Number of evaluated x positions
    pub points: usize,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            bandwidth: 7.0,
            display_ceiling: 140.0,
            points: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub x: f64,
    pub y: f64,
}

/// Speed curve for one merged benchmark
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedDistributionEntry {
    pub provider: String,
    pub model_name: String,
    pub display_name: String,
    pub mean_tokens_per_second: f64,
    pub min_tokens_per_second: f64,
    pub max_tokens_per_second: f64,
    pub density_points: Vec<DensityPoint>,
}

/// Standard normal density
pub fn gaussian_kernel(u: f64) -> f64 {
    (-0.5 * u * u).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Evaluate the KDE of `samples` on an even grid
///
/// Non-finite samples and samples above the display ceiling are ignored.
/// The x range is `[max(0, min - 3h), max + 3h]`. Returns no points when
/// nothing remains.
pub fn estimate_density(samples: &[f64], config: &DensityConfig) -> Vec<DensityPoint> {
    let kept: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v <= config.display_ceiling)
        .collect();
    if kept.is_empty() || config.points == 0 || config.bandwidth <= 0.0 {
        return Vec::new();
    }

    let h = config.bandwidth;
    let lo = kept.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = kept.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let start = (lo - 3.0 * h).max(0.0);
    let end = hi + 3.0 * h;
    let step = if config.points > 1 {
        (end - start) / (config.points - 1) as f64
    } else {
        0.0
    };
    let n = kept.len() as f64;

    (0..config.points)
        .map(|i| {
            let x = start + step * i as f64;
            let y = kept
                .iter()
                .map(|xi| gaussian_kernel((x - xi) / h))
                .sum::<f64>()
                / (n * h);
            DensityPoint { x, y }
        })
        .collect()
}

/// Speed distribution for every benchmark, estimated in parallel
pub fn project_speed_distribution(
    benchmarks: &[MergedBenchmark],
    config: &DensityConfig,
) -> Vec<SpeedDistributionEntry> {
    benchmarks
        .par_iter()
        .map(|benchmark| SpeedDistributionEntry {
            provider: benchmark.provider.clone(),
            model_name: benchmark.model_canonical().to_string(),
            display_name: benchmark.display_name.clone(),
            mean_tokens_per_second: round3(benchmark.stats.tokens_per_second_mean),
            min_tokens_per_second: round3(benchmark.stats.tokens_per_second_min),
            max_tokens_per_second: round3(benchmark.stats.tokens_per_second_max),
            density_points: estimate_density(benchmark.tokens_per_second(), config)
                .into_iter()
                .map(|p| DensityPoint {
                    x: round3(p.x),
                    y: round3(p.y),
                })
                .collect(),
        })
        .collect()
}
