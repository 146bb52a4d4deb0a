//! Records stored as JSON files
//!
//! Each object lives in `<dir>/<object id>.json` as a serialized
//! `ObjectRecord`. Handy for offline runs and for replaying broker data
//! captured earlier.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::DataFetcher;
use crate::error::FetchError;
use crate::record::{ObjectId, ObjectRecord};

#[derive(Debug, Clone)]
pub struct JsonDirFetcher {
    dir: PathBuf,
}

impl JsonDirFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the record for `object_id` is expected
    pub fn record_path(&self, object_id: &ObjectId) -> PathBuf {
        self.dir.join(format!("{}.json", object_id.file_stem()))
    }

    /// Write a record where `fetch` will find it
    pub fn store(&self, record: &ObjectRecord) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&record.object_id);
        let json = serde_json::to_vec_pretty(record)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

impl DataFetcher for JsonDirFetcher {
    fn fetch(&self, object_id: &ObjectId) -> Result<ObjectRecord, FetchError> {
        let path = self.record_path(object_id);
        tracing::debug!(object_id = %object_id, path = %path.display(), "Reading record");

        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FetchError::NotFound {
                object_id: object_id.to_string(),
            },
            _ => FetchError::Broker {
                object_id: object_id.to_string(),
                reason: format!("{}: {}", path.display(), e),
            },
        })?;

        let mut record: ObjectRecord =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed {
                object_id: object_id.to_string(),
                reason: e.to_string(),
            })?;

        if record.object_id != *object_id {
            tracing::warn!(
                "Record file {} names object {}, using requested ID {}",
                path.display(),
                record.object_id,
                object_id
            );
            record.object_id = object_id.clone();
        }
        if record.observations.is_empty() {
            return Err(FetchError::Malformed {
                object_id: object_id.to_string(),
                reason: "object has no observations".to_string(),
            });
        }
        Ok(record)
    }
}
