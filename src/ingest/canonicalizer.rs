//! Identity canonicalization
//!
//! Groups raw samples by their exact upstream (provider, model) strings and
//! computes per-group statistics. Invalid samples are dropped without
//! surfacing an error; the drop counts are reported for logging.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::compute_stats;
use super::types::{CanonicalAggregate, CanonicalKey, RawSample};

/// Throughput below this is a sentinel for a failed request
pub const MIN_VALID_TOKENS_PER_SECOND: f64 = 1.0;

/// Counts from one ingestion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub received: usize,
    pub accepted: usize,
    pub dropped_missing_identity: usize,
    pub dropped_invalid_throughput: usize,
    pub dropped_missing_timestamp: usize,
    pub groups: usize,
}

impl IngestReport {
    pub fn dropped(&self) -> usize {
        self.dropped_missing_identity
            + self.dropped_invalid_throughput
            + self.dropped_missing_timestamp
    }
}

/// Why a sample was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    MissingIdentity,
    InvalidThroughput,
    MissingTimestamp,
}

/// Accepted samples yield their run timestamp
fn validate(sample: &RawSample) -> Result<DateTime<Utc>, Rejection> {
    if sample.provider.trim().is_empty() || sample.model_name.trim().is_empty() {
        return Err(Rejection::MissingIdentity);
    }
    let tps = sample.tokens_per_second;
    if !tps.is_finite() || tps < MIN_VALID_TOKENS_PER_SECOND {
        return Err(Rejection::InvalidThroughput);
    }
    sample.run_ts.ok_or(Rejection::MissingTimestamp)
}

/// Group valid samples into canonical aggregates
///
/// Output is ordered by canonical key so downstream stages are deterministic.
pub fn canonicalize(samples: &[RawSample]) -> (Vec<CanonicalAggregate>, IngestReport) {
    let mut report = IngestReport {
        received: samples.len(),
        ..IngestReport::default()
    };

    let mut groups: BTreeMap<CanonicalKey, Vec<(DateTime<Utc>, &RawSample)>> = BTreeMap::new();
    for sample in samples {
        match validate(sample) {
            Ok(run_ts) => {
                report.accepted += 1;
                groups
                    .entry(CanonicalKey::new(
                        sample.provider.as_str(),
                        sample.model_name.as_str(),
                    ))
                    .or_default()
                    .push((run_ts, sample));
            }
            Err(rejection) => {
                tracing::debug!(
                    "Dropping sample {}/{}: {:?}",
                    sample.provider,
                    sample.model_name,
                    rejection
                );
                match rejection {
                    Rejection::MissingIdentity => report.dropped_missing_identity += 1,
                    Rejection::InvalidThroughput => report.dropped_invalid_throughput += 1,
                    Rejection::MissingTimestamp => report.dropped_missing_timestamp += 1,
                }
            }
        }
    }

    let aggregates: Vec<CanonicalAggregate> = groups
        .into_iter()
        .filter_map(|(key, mut members)| {
            members.sort_by_key(|(run_ts, _)| *run_ts);
            build_aggregate(key, &members)
        })
        .collect();

    report.groups = aggregates.len();

    tracing::debug!(
        "Canonicalized {} samples into {} groups ({} dropped)",
        report.received,
        report.groups,
        report.dropped()
    );

    (aggregates, report)
}

fn build_aggregate(
    key: CanonicalKey,
    members: &[(DateTime<Utc>, &RawSample)],
) -> Option<CanonicalAggregate> {
    let tokens_per_second: Vec<f64> = members.iter().map(|(_, s)| s.tokens_per_second).collect();
    let run_ts = members.iter().map(|(run_ts, _)| *run_ts).collect();
    let time_to_first_token: Vec<f64> = members
        .iter()
        .filter_map(|(_, s)| s.time_to_first_token)
        .filter(|v| v.is_finite())
        .collect();
    let display_hint = members
        .iter()
        .filter_map(|(_, s)| s.display_name.as_deref())
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string);

    let tps_stats = compute_stats(&tokens_per_second)?;
    let ttft_stats = compute_stats(&time_to_first_token);

    Some(CanonicalAggregate::new(
        key,
        display_hint,
        tokens_per_second,
        time_to_first_token,
        run_ts,
        tps_stats,
        ttft_stats,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(provider: &str, model: &str, tps: f64, minutes: i64) -> RawSample {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        RawSample::new(provider, model, tps, Some(0.5), base + Duration::minutes(minutes))
    }

    #[test]
    fn test_groups_by_exact_pair() {
        let samples = vec![
            sample("openai", "gpt-4", 30.0, 0),
            sample("openai", "gpt-4", 40.0, 1),
            sample("openai", "GPT-4", 50.0, 2),
            sample("azure", "gpt-4", 20.0, 3),
        ];
        let (aggregates, report) = canonicalize(&samples);

        assert_eq!(report.groups, 3);
        assert_eq!(report.accepted, 4);
        let keys: Vec<String> = aggregates.iter().map(|a| a.key().to_string()).collect();
        assert_eq!(keys, vec!["azure/gpt-4", "openai/GPT-4", "openai/gpt-4"]);

        let gpt4 = &aggregates[2];
        assert_eq!(gpt4.tokens_per_second(), &[30.0, 40.0]);
        assert_eq!(gpt4.tokens_per_second_stats().mean, 35.0);
    }

    #[test]
    fn test_drops_invalid_samples_silently() {
        let mut blank = sample("", "gpt-4", 30.0, 0);
        blank.provider = "   ".to_string();
        let samples = vec![
            blank,
            sample("openai", "", 30.0, 0),
            sample("openai", "gpt-4", 0.5, 0),
            sample("openai", "gpt-4", f64::NAN, 0),
            sample("openai", "gpt-4", 1.0, 0),
        ];
        let (aggregates, report) = canonicalize(&samples);

        assert_eq!(report.received, 5);
        assert_eq!(report.dropped_missing_identity, 2);
        assert_eq!(report.dropped_invalid_throughput, 2);
        assert_eq!(report.accepted, 1);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].tokens_per_second(), &[1.0]);
    }

    #[test]
    fn test_samples_ordered_by_run_ts() {
        let samples = vec![
            sample("openai", "gpt-4", 30.0, 10),
            sample("openai", "gpt-4", 10.0, 0),
            sample("openai", "gpt-4", 20.0, 5),
        ];
        let (aggregates, _) = canonicalize(&samples);
        assert_eq!(aggregates[0].tokens_per_second(), &[10.0, 20.0, 30.0]);
        assert!(aggregates[0].run_ts().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_non_finite_latency_does_not_drop_throughput() {
        let mut s = sample("openai", "gpt-4", 30.0, 0);
        s.time_to_first_token = Some(f64::INFINITY);
        let (aggregates, _) = canonicalize(&[s]);

        assert_eq!(aggregates[0].tokens_per_second(), &[30.0]);
        assert!(aggregates[0].time_to_first_token().is_empty());
        assert!(aggregates[0].time_to_first_token_stats().is_none());
    }

    #[test]
    fn test_canonical_strings_kept_verbatim() {
        let (aggregates, _) = canonicalize(&[sample("Vertex ", "Gemini-1.5-Pro", 42.0, 0)]);
        assert_eq!(aggregates[0].provider_canonical(), "Vertex ");
        assert_eq!(aggregates[0].model_canonical(), "Gemini-1.5-Pro");
    }

    #[test]
    fn test_drops_samples_without_timestamp() {
        let json = r#"[
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": 30, "run_ts": "2024-05-01T12:00:00Z"},
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": 40, "run_ts": null},
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": 50, "run_ts": "last tuesday"},
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": "fast", "run_ts": "2024-05-01T13:00:00Z"}
        ]"#;
        let samples: Vec<RawSample> = serde_json::from_str(json).unwrap();
        let (aggregates, report) = canonicalize(&samples);

        assert_eq!(report.received, 4);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.dropped_missing_timestamp, 2);
        assert_eq!(report.dropped_invalid_throughput, 1);
        assert_eq!(report.dropped(), 3);
        assert_eq!(aggregates[0].tokens_per_second(), &[30.0]);
    }
}
