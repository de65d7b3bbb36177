//! JSON input files for the `run` command

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::ingest::RawSample;
use crate::lifecycle::{LifecycleIndex, LifecycleRecord};
use crate::projection::{MedianSnapshotSource, SnapshotRecord};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Raw sample batch (a JSON array)
pub async fn load_samples(path: &Path) -> Result<Vec<RawSample>, InputError> {
    let samples: Vec<RawSample> = read_json(path).await?;
    tracing::debug!("Loaded {} samples from {:?}", samples.len(), path);
    Ok(samples)
}

/// Lifecycle annotations keyed by provider and model
pub async fn load_lifecycle(path: &Path) -> Result<LifecycleIndex, InputError> {
    let records: Vec<LifecycleRecord> = read_json(path).await?;
    tracing::debug!("Loaded {} lifecycle records from {:?}", records.len(), path);
    Ok(LifecycleIndex::from_records(records))
}

/// Snapshot profiles for deprecated models
pub async fn load_snapshots(path: &Path) -> Result<MedianSnapshotSource, InputError> {
    let records: Vec<SnapshotRecord> = read_json(path).await?;
    tracing::debug!("Loaded {} snapshot profiles from {:?}", records.len(), path);
    Ok(MedianSnapshotSource::from_records(records))
}
