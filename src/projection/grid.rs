//! Timestamp grid shared by every time series
//!
//! The grid is anchored to "now" floored to a 30-minute boundary and walks
//! backwards in whole multiples of the interval. The step is chosen so the
//! grid never exceeds [`MAX_GRID_POINTS`] and still covers the requested
//! window to within one step.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::pipeline::PipelineError;

/// Grid spacing before any subsampling
pub const INTERVAL_MINUTES: i64 = 30;
pub const INTERVALS_PER_DAY: u64 = 48;
pub const MAX_GRID_POINTS: u64 = 144;

/// Ascending, evenly spaced timestamps ending at the anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampGrid {
    timestamps: Vec<DateTime<Utc>>,
    step: Duration,
}

impl TimestampGrid {
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Distance between neighbouring points
    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    /// The anchor
    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Time between first and last point
    pub fn span(&self) -> Duration {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last - first,
            _ => Duration::zero(),
        }
    }

    /// Whether `ts` lies strictly between the first and last point
    pub fn strictly_contains(&self, ts: DateTime<Utc>) -> bool {
        matches!((self.first(), self.last()), (Some(first), Some(last)) if first < ts && ts < last)
    }

    /// Index of the last slot at or before `ts`
    pub fn last_slot_at_or_before(&self, ts: DateTime<Utc>) -> Option<usize> {
        let after = self.timestamps.partition_point(|slot| *slot <= ts);
        after.checked_sub(1)
    }

    /// ISO 8601 strings with millisecond precision
    pub fn iso_strings(&self) -> Vec<String> {
        self.timestamps.iter().map(|ts| iso_timestamp(*ts)).collect()
    }
}

impl Serialize for TimestampGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.iso_strings().serialize(serializer)
    }
}

/// `2024-05-01T12:00:00.000Z`
pub fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Floor to the previous 30-minute boundary
pub fn floor_to_interval(now: DateTime<Utc>) -> DateTime<Utc> {
    let interval = INTERVAL_MINUTES * 60;
    let secs = now.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(interval), 0).unwrap_or(now)
}

/// Build the grid for a window of `days` ending at `now`
pub fn build_grid(days: u32, now: DateTime<Utc>) -> Result<TimestampGrid, PipelineError> {
    if days == 0 {
        return Err(PipelineError::InvalidDays(days));
    }

    let total = u64::from(days) * INTERVALS_PER_DAY;
    let step_intervals = total.div_ceil(MAX_GRID_POINTS).max(1);
    let points = total.div_ceil(step_intervals).min(MAX_GRID_POINTS);

    let anchor = floor_to_interval(now);
    let step = Duration::minutes(INTERVAL_MINUTES * step_intervals as i64);
    let timestamps = (0..points as i32)
        .rev()
        .map(|i| anchor - step * i)
        .collect::<Vec<_>>();

    tracing::debug!(
        "Built grid: days={} points={} step={}min",
        days,
        timestamps.len(),
        step.num_minutes()
    );

    Ok(TimestampGrid { timestamps, step })
}
