//! alert-subjects
//!
//! Turns alert-broker objects into subjects for a citizen-science
//! platform: for each object ID the record is fetched once, every
//! configured media generator renders its artifact (cutout images,
//! lightcurve documents), and the results are bundled with metadata into
//! a `Subject` that can be saved to disk and handed to an upload client.
//!
//! ```rust,ignore
//! use alert_subjects::{JsonDirFetcher, JsonLocation, SubjectGenerator, TripletImageLocation};
//!
//! let generators: Vec<Box<dyn MediaGenerator>> = vec![
//!     Box::new(TripletImageLocation::new(RenderConfig::default())),
//!     Box::new(JsonLocation::default()),
//! ];
//! for mut subject in SubjectGenerator::new(ids, JsonDirFetcher::new("records"), generators)? {
//!     subject.save(Path::new("subjects"));
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod media;
pub mod record;
pub mod subject;

pub use config::{Config, RenderConfig};
pub use error::{ConfigError, FetchError, GenerateError, SaveError};
pub use fetch::{DataFetcher, HttpBrokerClient, JsonDirFetcher, LasairFetcher};
pub use media::{
    JsonLocation, MediaArtifact, MediaGenerator, PanelImageLocation, TripletImageLocation,
};
pub use record::{ImageTriplet, ObjectId, ObjectRecord, Observation, Panel, Stamp};
pub use subject::{SaveState, Subject, SubjectGenerator, SubjectManifest};
