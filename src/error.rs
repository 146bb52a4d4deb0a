//! Error types for subject generation
//!
//! Each stage of the pipeline has its own error type so the driver can
//! apply a different policy per stage:
//! - `FetchError` skips one object ID
//! - `GenerateError` drops one role from an otherwise complete subject
//! - `SaveError` fails one file write while the others proceed
//! - `ConfigError` is raised before any iteration happens

use std::path::PathBuf;
use thiserror::Error;

use crate::record::Panel;

/// Failure to obtain an `ObjectRecord` from the broker
#[derive(Debug, Error)]
pub enum FetchError {
    /// The broker does not know this object
    #[error("Object not found: {object_id}")]
    NotFound { object_id: String },

    /// Broker unreachable or returned an error status
    #[error("Broker request failed for {object_id}: {reason}")]
    Broker { object_id: String, reason: String },

    /// The broker answered but the payload could not be interpreted
    #[error("Malformed broker response for {object_id}: {reason}")]
    Malformed { object_id: String, reason: String },
}

impl FetchError {
    /// The object ID the failed fetch was for
    pub fn object_id(&self) -> &str {
        match self {
            FetchError::NotFound { object_id }
            | FetchError::Broker { object_id, .. }
            | FetchError::Malformed { object_id, .. } => object_id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Failure of one media generator for one object
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The record lacks the data this generator needs
    #[error("Insufficient data for {object_id}: no image triplet to render the {panel} panel")]
    InsufficientData { object_id: String, panel: Panel },

    /// The stamps of one triplet do not share dimensions
    #[error("Stamp shapes differ in triplet for {object_id}: {detail}")]
    ShapeMismatch { object_id: String, detail: String },

    /// Image encoding failed
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    /// Document serialization failed
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to persist one artifact of a subject
#[derive(Debug, Error)]
#[error("Failed to save {role} to {}: {kind}", path.display())]
pub struct SaveError {
    pub role: String,
    pub path: PathBuf,
    pub kind: SaveErrorKind,
}

/// What went wrong while saving an artifact
#[derive(Debug, Error)]
pub enum SaveErrorKind {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Encode(#[from] GenerateError),
}

/// Invalid configuration, detected before iteration starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one media generator must be configured")]
    NoGenerators,

    #[error("Media generator role '{0}' is configured more than once")]
    DuplicateRole(String),

    #[error("Unknown media generator role '{0}'")]
    UnknownRole(String),

    #[error("Object ID at position {position} is empty")]
    InvalidObjectId { position: usize },

    #[error("Start index {start_index} overflows with {objects} object IDs queued")]
    StartIndexOverflow { start_index: u64, objects: usize },

    #[error("Invalid render settings: {0}")]
    InvalidRender(String),

    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
