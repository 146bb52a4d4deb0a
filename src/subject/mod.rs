//! Subjects
//!
//! A subject bundles every artifact generated for one object ID with its
//! metadata. It is built entirely in memory; nothing touches the disk until
//! `Subject::save` is called. After saving, the subject exposes the file
//! paths and metadata an upload client needs.
//!
//! Metadata keys written here:
//! - `object_id`, `#generation_index` at construction
//! - `#error_<role>` for each role whose generator failed
//! - `#file_<role>` for each role saved to disk

pub mod generator;

pub use generator::{GeneratorState, SubjectGenerator};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{GenerateError, SaveError, SaveErrorKind};
use crate::media::MediaArtifact;
use crate::record::{file_safe, ObjectId};

/// Where a subject stands with respect to the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveState {
    /// `save` has not been called
    Unsaved,
    /// Some roles were written, others failed
    PartiallySaved {
        saved: Vec<String>,
        failed: Vec<String>,
    },
    /// Every artifact is on disk
    Saved,
}

/// Outcome of one `save` call
#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: IndexMap<String, PathBuf>,
    pub failed: Vec<SaveError>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One saved media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub role: String,
    pub path: PathBuf,
    pub mime_type: String,
}

/// What an upload client needs to know about a saved subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectManifest {
    pub object_id: ObjectId,
    pub generation_index: u64,
    pub locations: Vec<Location>,
    pub metadata: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_roles: Vec<String>,
}

/// Generated media and metadata for one object ID
#[derive(Debug, Clone)]
pub struct Subject {
    object_id: ObjectId,
    index: u64,
    artifacts: IndexMap<String, MediaArtifact>,
    failures: IndexMap<String, String>,
    metadata: IndexMap<String, Value>,
    saved: IndexMap<String, PathBuf>,
    save_failures: IndexMap<String, String>,
    save_attempted: bool,
}

impl Subject {
    pub fn new(object_id: ObjectId, index: u64) -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert("object_id".to_string(), Value::from(object_id.as_str()));
        metadata.insert("#generation_index".to_string(), Value::from(index));

        Self {
            object_id,
            index,
            artifacts: IndexMap::new(),
            failures: IndexMap::new(),
            metadata,
            saved: IndexMap::new(),
            save_failures: IndexMap::new(),
            save_attempted: false,
        }
    }

    /// Subject holding `artifacts`, keyed by their roles
    pub fn from_artifacts(
        object_id: ObjectId,
        index: u64,
        artifacts: impl IntoIterator<Item = MediaArtifact>,
    ) -> Self {
        let mut subject = Self::new(object_id, index);
        for artifact in artifacts {
            subject.insert_artifact(artifact);
        }
        subject
    }

    /// Add an artifact; a second artifact for the same role replaces the first
    pub fn insert_artifact(&mut self, artifact: MediaArtifact) {
        let role = artifact.role().to_string();
        self.failures.shift_remove(&role);
        self.metadata.shift_remove(&format!("#error_{role}"));
        self.artifacts.insert(role, artifact);
    }

    /// Note that the generator for `role` failed
    pub fn record_failure(&mut self, role: &str, error: &GenerateError) {
        let message = error.to_string();
        self.metadata
            .insert(format!("#error_{role}"), Value::from(message.clone()));
        self.failures.insert(role.to_string(), message);
    }

    /// Set an arbitrary metadata field
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn metadata(&self) -> &IndexMap<String, Value> {
        &self.metadata
    }

    pub fn artifact(&self, role: &str) -> Option<&MediaArtifact> {
        self.artifacts.get(role)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &MediaArtifact> {
        self.artifacts.values()
    }

    /// Roles with an artifact, in generation order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Roles whose generator failed, with the error message
    pub fn failures(&self) -> &IndexMap<String, String> {
        &self.failures
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// File name for `role`: `<object id>_<index>_<role>.<ext>`
    pub fn file_name(&self, role: &str, extension: &str) -> String {
        format!(
            "{}_{:04}_{}.{}",
            self.object_id.file_stem(),
            self.index,
            file_safe(role),
            extension
        )
    }

    /// Write every artifact into `dir`
    ///
    /// Each artifact is encoded in memory, then written through its own file
    /// handle which is closed before the next artifact starts. A failed write
    /// is reported and the remaining artifacts are still attempted; files
    /// written earlier are kept. Saving again overwrites with identical
    /// content.
    pub fn save(&mut self, dir: &Path) -> SaveReport {
        self.save_attempted = true;
        self.save_failures.clear();
        let mut report = SaveReport::default();

        let dir_error = fs::create_dir_all(dir).err();

        for (role, artifact) in &self.artifacts {
            let file_name = self.file_name(role, artifact.extension());
            let path = dir.join(&file_name);

            let result = match &dir_error {
                Some(e) => Err(SaveErrorKind::Io(std::io::Error::new(e.kind(), e.to_string()))),
                None => write_artifact(&path, artifact),
            };

            match result {
                Ok(bytes) => {
                    tracing::debug!(role = %role, path = %path.display(), bytes, "Saved artifact");
                    self.metadata
                        .insert(format!("#file_{role}"), Value::from(file_name));
                    self.saved.insert(role.clone(), path.clone());
                    report.saved.insert(role.clone(), path);
                }
                Err(kind) => {
                    let error = SaveError {
                        role: role.clone(),
                        path,
                        kind,
                    };
                    tracing::warn!("{}", error);
                    self.save_failures.insert(role.clone(), error.to_string());
                    self.saved.shift_remove(role);
                    self.metadata.shift_remove(&format!("#file_{role}"));
                    report.failed.push(error);
                }
            }
        }

        tracing::info!(
            object_id = %self.object_id,
            index = self.index,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Saved subject"
        );
        report
    }

    pub fn save_state(&self) -> SaveState {
        if !self.save_attempted {
            return SaveState::Unsaved;
        }
        if self.save_failures.is_empty() {
            return SaveState::Saved;
        }
        SaveState::PartiallySaved {
            saved: self.saved.keys().cloned().collect(),
            failed: self.save_failures.keys().cloned().collect(),
        }
    }

    /// Path of the saved file for `role`
    pub fn saved_path(&self, role: &str) -> Option<&Path> {
        self.saved.get(role).map(PathBuf::as_path)
    }

    /// Saved files in generation order
    pub fn locations(&self) -> Vec<Location> {
        self.artifacts
            .iter()
            .filter_map(|(role, artifact)| {
                self.saved.get(role).map(|path| Location {
                    role: role.clone(),
                    path: path.clone(),
                    mime_type: artifact.mime_type().to_string(),
                })
            })
            .collect()
    }

    pub fn manifest(&self) -> SubjectManifest {
        SubjectManifest {
            object_id: self.object_id.clone(),
            generation_index: self.index,
            locations: self.locations(),
            metadata: self.metadata.clone(),
            missing_roles: self.failures.keys().cloned().collect(),
        }
    }
}

/// Encode and write one artifact, returning the byte count
fn write_artifact(path: &Path, artifact: &MediaArtifact) -> Result<usize, SaveErrorKind> {
    let bytes = artifact.encode()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Panel;
    use image::{GrayImage, ImageFormat, Luma};
    use serde_json::json;

    fn subject() -> Subject {
        Subject::from_artifacts(
            ObjectId::from("ZTF21/abc"),
            7,
            [
                MediaArtifact::image(
                    "triplet",
                    GrayImage::from_pixel(4, 2, Luma([128])),
                    ImageFormat::Png,
                ),
                MediaArtifact::document("json", json!({"data": []})),
            ],
        )
    }

    #[test]
    fn test_new_subject_metadata() {
        let s = subject();
        assert_eq!(s.metadata()["object_id"], "ZTF21/abc");
        assert_eq!(s.metadata()["#generation_index"], 7);
        assert_eq!(s.roles().collect::<Vec<_>>(), vec!["triplet", "json"]);
        assert_eq!(s.save_state(), SaveState::Unsaved);
        assert!(s.locations().is_empty());
    }

    #[test]
    fn test_file_names_include_id_and_index() {
        let s = subject();
        assert_eq!(s.file_name("triplet", "png"), "ZTF21_abc_0007_triplet.png");
    }

    #[test]
    fn test_save_writes_files_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = subject();

        let report = s.save(&dir.path().join("out"));
        assert!(report.is_complete());
        assert_eq!(s.save_state(), SaveState::Saved);

        let png = s.saved_path("triplet").unwrap();
        assert!(png.exists());
        assert_eq!(image::open(png).unwrap().width(), 4);
        let json = std::fs::read_to_string(s.saved_path("json").unwrap()).unwrap();
        assert_eq!(json, r#"{"data":[]}"#);

        assert_eq!(s.metadata()["#file_json"], "ZTF21_abc_0007_json.json");
        let locations = s.locations();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].mime_type, "image/png");
        assert_eq!(locations[1].mime_type, "application/json");
    }

    #[test]
    fn test_save_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = subject();

        s.save(dir.path());
        let first: Vec<Vec<u8>> = s
            .locations()
            .iter()
            .map(|l| std::fs::read(&l.path).unwrap())
            .collect();

        let report = s.save(dir.path());
        assert!(report.is_complete());
        let second: Vec<Vec<u8>> = s
            .locations()
            .iter()
            .map(|l| std::fs::read(&l.path).unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_save_keeps_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = subject();
        // a directory squatting on the json file name makes that write fail
        std::fs::create_dir(dir.path().join(s.file_name("json", "json"))).unwrap();

        let report = s.save(dir.path());
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].role, "json");

        assert_eq!(
            s.save_state(),
            SaveState::PartiallySaved {
                saved: vec!["triplet".to_string()],
                failed: vec!["json".to_string()],
            }
        );
        assert!(s.saved_path("triplet").unwrap().exists());
        assert_eq!(s.locations().len(), 1);
    }

    #[test]
    fn test_failed_resave_drops_file_reference() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut s = subject();

        assert!(s.save(first.path()).is_complete());
        assert!(s.metadata().contains_key("#file_json"));

        std::fs::create_dir(second.path().join(s.file_name("json", "json"))).unwrap();
        let report = s.save(second.path());
        assert_eq!(report.failed.len(), 1);

        assert!(s.saved_path("json").is_none());
        assert!(!s.metadata().contains_key("#file_json"));
        assert!(!s.manifest().metadata.contains_key("#file_json"));
        assert_eq!(
            s.metadata()["#file_triplet"],
            s.file_name("triplet", "png").as_str()
        );
        assert_eq!(s.locations().len(), 1);
    }

    #[test]
    fn test_unwritable_directory_fails_every_role() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let mut s = subject();
        let report = s.save(&blocker.join("sub"));
        assert_eq!(report.failed.len(), 2);
        assert!(report.saved.is_empty());
    }

    #[test]
    fn test_failure_recorded_in_metadata_and_manifest() {
        let mut s = subject();
        let error = GenerateError::InsufficientData {
            object_id: "ZTF21/abc".into(),
            panel: Panel::Science,
        };
        s.record_failure("science", &error);

        assert!(!s.is_complete());
        assert!(s.artifact("science").is_none());
        let message = s.metadata()["#error_science"].as_str().unwrap();
        assert!(message.contains("science"));

        let manifest = s.manifest();
        assert_eq!(manifest.missing_roles, vec!["science"]);
        assert_eq!(manifest.generation_index, 7);
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["object_id"], "ZTF21/abc");
    }
}
