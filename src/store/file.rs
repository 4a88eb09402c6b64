//! JSON flat-file backend.

use super::{Store, StoreError};
use crate::record::{self, Record};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Store holding the full collection in memory and mirroring it to one JSON file.
///
/// Every save rewrites the whole file, so writes cost O(n) in the collection
/// size.
#[derive(Debug)]
pub struct FlatFileStore<T> {
    path: PathBuf,
    records: RwLock<Vec<T>>,
}

impl<T> FlatFileStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    /// Open the store at `path`, loading any records already there.
    ///
    /// A missing file starts an empty collection. A file that does not decode
    /// fails the open rather than being overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records: Vec<T> = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                Vec::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        info!(
            path = %path.display(),
            records = records.len(),
            "opened {} file store",
            T::type_name()
        );

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records currently held.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }

    /// Write the collection to a sibling temp file, then rename it over the target.
    fn persist(&self, records: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;

        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl<T> Store<T> for FlatFileStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    fn save(&self, record: T) -> Result<(), StoreError> {
        record::validate(&record)?;

        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        records.push(record);

        // Keep memory and disk in step when the write fails.
        if let Err(e) = self.persist(&records) {
            records.pop();
            return Err(e);
        }

        debug!(total = records.len(), "saved {} to file", T::type_name());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<T>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.clone())
    }

    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<T>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| {
                let ts = r.timestamp();
                start <= ts && ts <= end
            })
            .cloned()
            .collect())
    }
}
