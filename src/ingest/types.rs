//! Shared types for sample ingestion
//!
//! Defines the raw input record, the frozen canonical identity and the
//! per-identity aggregate produced by the canonicalizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One benchmark request as reported upstream
///
/// Every field is read leniently: a null, missing or mistyped value becomes
/// an empty or invalid value that [`crate::ingest::canonicalize`] drops and
/// counts, so one bad record never rejects the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Upstream provider id (e.g. "vertex")
    #[serde(default, deserialize_with = "lenient_string")]
    pub provider: String,
    /// Upstream model id (e.g. "gemini-1.5-pro")
    #[serde(default, deserialize_with = "lenient_string")]
    pub model_name: String,
    /// Optional human label supplied by the benchmark runner
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    /// Output throughput; NaN when the upstream value is not a number
    #[serde(default, deserialize_with = "lenient_throughput")]
    pub tokens_per_second: f64,
    /// Latency until the first streamed token, in seconds
    #[serde(default, deserialize_with = "lenient_latency")]
    pub time_to_first_token: Option<f64>,
    /// When the request ran; `None` when absent or unparsable
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub run_ts: Option<DateTime<Utc>>,
}

impl RawSample {
    /// Create a sample without a display hint
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
        tokens_per_second: f64,
        time_to_first_token: Option<f64>,
        run_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            display_name: None,
            tokens_per_second,
            time_to_first_token,
            run_ts: Some(run_ts),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_throughput<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => 0.0,
        other => number(&other).unwrap_or(f64::NAN),
    })
}

fn lenient_latency<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        _ => None,
    })
}

/// Canonical identity of a benchmark: the raw upstream strings
///
/// Fields are private so the identity cannot change once created. Every
/// internal key, URL slug and dedup decision is derived from this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey {
    provider: String,
    model: String,
}

impl CanonicalKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Canonical provider id
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Canonical model id
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Summary statistics over one sample array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Approximate first quartile
    pub q1: f64,
    /// Approximate median
    pub median: f64,
    /// Approximate third quartile
    pub q3: f64,
}

/// All valid samples sharing one exact (provider, model) pair
///
/// Built once per batch by the canonicalizer and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAggregate {
    key: CanonicalKey,
    display_hint: Option<String>,
    tokens_per_second: Vec<f64>,
    time_to_first_token: Vec<f64>,
    run_ts: Vec<DateTime<Utc>>,
    tokens_per_second_stats: SampleStats,
    time_to_first_token_stats: Option<SampleStats>,
}

impl CanonicalAggregate {
    pub(crate) fn new(
        key: CanonicalKey,
        display_hint: Option<String>,
        tokens_per_second: Vec<f64>,
        time_to_first_token: Vec<f64>,
        run_ts: Vec<DateTime<Utc>>,
        tokens_per_second_stats: SampleStats,
        time_to_first_token_stats: Option<SampleStats>,
    ) -> Self {
        Self {
            key,
            display_hint,
            tokens_per_second,
            time_to_first_token,
            run_ts,
            tokens_per_second_stats,
            time_to_first_token_stats,
        }
    }

    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    pub fn provider_canonical(&self) -> &str {
        self.key.provider()
    }

    pub fn model_canonical(&self) -> &str {
        self.key.model()
    }

    /// First non-empty display label reported with the samples, if any
    pub fn display_hint(&self) -> Option<&str> {
        self.display_hint.as_deref()
    }

    /// Throughput samples ordered by `run_ts`
    pub fn tokens_per_second(&self) -> &[f64] {
        &self.tokens_per_second
    }

    /// Finite latency samples ordered by `run_ts`
    pub fn time_to_first_token(&self) -> &[f64] {
        &self.time_to_first_token
    }

    /// Timestamps parallel to [`Self::tokens_per_second`]
    pub fn run_ts(&self) -> &[DateTime<Utc>] {
        &self.run_ts
    }

    pub fn tokens_per_second_stats(&self) -> &SampleStats {
        &self.tokens_per_second_stats
    }

    pub fn time_to_first_token_stats(&self) -> Option<&SampleStats> {
        self.time_to_first_token_stats.as_ref()
    }

    pub fn latest_run(&self) -> Option<DateTime<Utc>> {
        self.run_ts.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sample_tolerates_nulls() {
        let json = r#"{
            "provider": null,
            "model_name": "gpt-4",
            "tokens_per_second": null,
            "time_to_first_token": null,
            "run_ts": "2024-05-01T12:00:00Z"
        }"#;
        let sample: RawSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.provider, "");
        assert_eq!(sample.tokens_per_second, 0.0);
        assert_eq!(sample.time_to_first_token, None);
    }

    #[test]
    fn test_raw_sample_tolerates_bad_fields() {
        let json = r#"[
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": 30, "run_ts": null},
            {"provider": "openai", "model_name": "gpt-4", "tokens_per_second": "fast",
             "time_to_first_token": "n/a", "run_ts": "yesterday"},
            {"provider": 7, "model_name": "gpt-4", "tokens_per_second": "41.5"}
        ]"#;
        let samples: Vec<RawSample> = serde_json::from_str(json).unwrap();
        assert_eq!(samples.len(), 3);

        assert_eq!(samples[0].run_ts, None);
        assert_eq!(samples[0].tokens_per_second, 30.0);

        assert!(samples[1].tokens_per_second.is_nan());
        assert_eq!(samples[1].time_to_first_token, None);
        assert_eq!(samples[1].run_ts, None);

        assert_eq!(samples[2].provider, "");
        assert_eq!(samples[2].tokens_per_second, 41.5);
        assert_eq!(samples[2].run_ts, None);
    }

    #[test]
    fn test_raw_sample_reads_display_hint() {
        let json = r#"{
            "provider": "openai",
            "model_name": "gpt-4-0613",
            "display_name": "GPT-4",
            "tokens_per_second": 31.5,
            "time_to_first_token": 0.42,
            "run_ts": "2024-05-01T12:00:00.000Z"
        }"#;
        let sample: RawSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.display_name.as_deref(), Some("GPT-4"));
        assert_eq!(sample.time_to_first_token, Some(0.42));
    }

    #[test]
    fn test_canonical_key_display() {
        let key = CanonicalKey::new("vertex", "gemini-1.5-pro");
        assert_eq!(key.to_string(), "vertex/gemini-1.5-pro");
        assert_eq!(key.provider(), "vertex");
        assert_eq!(key.model(), "gemini-1.5-pro");
    }
}
