// Failed batch dumps
//
// Batches that could not be queued or processed are written as individual
// JSON files so they can be inspected or replayed later.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::StorageError;

/// Writes failed batches into a directory, one file per batch
#[derive(Debug)]
pub struct FailedBatchWriter {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl FailedBatchWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `batch` into a new file and return its path
    pub fn write<T: Serialize>(&self, batch: &T) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.dir)?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("batch_{}_{:04}.json", now_timestamp_ms(), seq));
        fs::write(&path, serde_json::to_vec_pretty(batch)?)?;

        log::warn!("[FailedBatchWriter] Persisted failed batch to {:?}", path);
        Ok(path)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
