// Storage module - machine profile persistence
//
// Profiles are keyed by machine id. `list` is called on every live batch,
// so implementations serve it from memory; only `upsert` and `delete`
// may touch the disk. Failed batches and the frame log are plain files
// written off the ingestion path.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::calibration::MachineProfile;
use crate::error::StorageError;

pub mod failed_batches;
pub mod frame_log;
pub mod json_file;

pub use failed_batches::FailedBatchWriter;
pub use frame_log::{FrameLog, FrameRecord};
pub use json_file::JsonFileProfileStore;

/// Keyed profile storage shared between calibration and detection
pub trait ProfileStore: Send + Sync {
    /// Profile for `machine_id`, if one exists
    fn get(&self, machine_id: &str) -> Result<Option<MachineProfile>, StorageError>;

    /// Every profile, ordered by machine id
    fn list(&self) -> Result<Vec<MachineProfile>, StorageError>;

    /// Insert or replace the profile with the same machine id
    fn upsert(&self, profile: MachineProfile) -> Result<(), StorageError>;

    /// Remove a profile; `false` when it did not exist
    fn delete(&self, machine_id: &str) -> Result<bool, StorageError>;
}

/// Volatile store used by tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<BTreeMap<String, MachineProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `profiles`
    pub fn with_profiles(profiles: impl IntoIterator<Item = MachineProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.machine_id.clone(), p))
            .collect();
        Self {
            profiles: RwLock::new(map),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MachineProfile>>, StorageError> {
        self.profiles.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MachineProfile>>, StorageError> {
        self.profiles.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, machine_id: &str) -> Result<Option<MachineProfile>, StorageError> {
        Ok(self.read()?.get(machine_id).cloned())
    }

    fn list(&self) -> Result<Vec<MachineProfile>, StorageError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn upsert(&self, profile: MachineProfile) -> Result<(), StorageError> {
        self.write()?.insert(profile.machine_id.clone(), profile);
        Ok(())
    }

    fn delete(&self, machine_id: &str) -> Result<bool, StorageError> {
        Ok(self.write()?.remove(machine_id).is_some())
    }
}
