// JSON file backed profile store
//
// The whole document is rewritten on every mutation: serialized to a
// sibling `.new` file and renamed over the original, so a crash mid-write
// leaves the previous document intact.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::ProfileStore;
use crate::calibration::MachineProfile;
use crate::error::StorageError;

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ProfileDocument {
    version: u32,
    profiles: Vec<MachineProfile>,
}

/// Profile store persisted as a single JSON document
#[derive(Debug)]
pub struct JsonFileProfileStore {
    path: PathBuf,
    profiles: RwLock<BTreeMap<String, MachineProfile>>,
}

impl JsonFileProfileStore {
    /// Open the store at `path`, creating an empty one if the file is missing
    ///
    /// # Errors
    /// `Io` if the file exists but cannot be read, `Serialization` if it is
    /// not a valid profile document.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let profiles = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let document: ProfileDocument = serde_json::from_str(&contents)?;
            log::info!(
                "[ProfileStore] Loaded {} profiles from {:?}",
                document.profiles.len(),
                path
            );
            document
                .profiles
                .into_iter()
                .map(|p| (p.machine_id.clone(), p))
                .collect()
        } else {
            log::info!("[ProfileStore] No profile file at {:?}, starting empty", path);
            BTreeMap::new()
        };

        Ok(Self {
            path,
            profiles: RwLock::new(profiles),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MachineProfile>>, StorageError> {
        self.profiles.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MachineProfile>>, StorageError> {
        self.profiles.write().map_err(|_| StorageError::LockPoisoned)
    }

    /// Write the document; called with the write lock held
    fn persist(&self, profiles: &BTreeMap<String, MachineProfile>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let document = ProfileDocument {
            version: DOCUMENT_VERSION,
            profiles: profiles.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        let tmp_path = with_suffix(&self.path, "new");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl ProfileStore for JsonFileProfileStore {
    fn get(&self, machine_id: &str) -> Result<Option<MachineProfile>, StorageError> {
        Ok(self.read()?.get(machine_id).cloned())
    }

    fn list(&self) -> Result<Vec<MachineProfile>, StorageError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn upsert(&self, profile: MachineProfile) -> Result<(), StorageError> {
        let mut profiles = self.write()?;
        let previous = profiles.insert(profile.machine_id.clone(), profile.clone());

        if let Err(err) = self.persist(&profiles) {
            // Keep memory consistent with the file
            match previous {
                Some(old) => profiles.insert(old.machine_id.clone(), old),
                None => profiles.remove(&profile.machine_id),
            };
            return Err(err);
        }
        Ok(())
    }

    fn delete(&self, machine_id: &str) -> Result<bool, StorageError> {
        let mut profiles = self.write()?;
        let Some(removed) = profiles.remove(machine_id) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&profiles) {
            profiles.insert(removed.machine_id.clone(), removed);
            return Err(err);
        }
        Ok(true)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("profiles")
        .to_string();
    name.push('.');
    name.push_str(suffix);
    path.with_file_name(name)
}
