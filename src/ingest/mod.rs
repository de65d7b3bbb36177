//! Sample ingestion and identity canonicalization
//!
//! ```text
//! RawSample[] ──▶ validate ──▶ group by exact (provider, model) ──▶ CanonicalAggregate[]
//!                    │
//!                    └─▶ dropped (counted in IngestReport)
//! ```
//!
//! Canonical identities are the raw upstream strings. They are never
//! normalized here; display-facing names are resolved later by
//! [`crate::display`].

pub mod canonicalizer;
pub mod stats;
pub mod types;

pub use canonicalizer::{canonicalize, IngestReport, MIN_VALID_TOKENS_PER_SECOND};
pub use stats::{compute_stats, mean};
pub use types::{CanonicalAggregate, CanonicalKey, RawSample, SampleStats};
