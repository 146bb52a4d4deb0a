//! Media generation
//!
//! This module handles:
//! - The `MediaGenerator` contract every media variant implements
//! - Rendering cutout stamps to contrast-normalized images (cutout.rs)
//! - Serializing photometry to lightcurve documents (lightcurve.rs)
//! - Encoding finished artifacts for saving

pub mod cutout;
pub mod lightcurve;
pub mod normalize;

pub use cutout::{PanelImageLocation, TripletImageLocation};
pub use lightcurve::JsonLocation;

use image::{GrayImage, ImageFormat};
use std::io::Cursor;

use crate::config::Config;
use crate::error::{ConfigError, GenerateError};
use crate::record::{ObjectId, ObjectRecord, Panel};

/// A strategy producing one kind of media from fetched object data
///
/// Implementations must be pure functions of their inputs so one instance
/// can serve every object of a run, from any thread.
pub trait MediaGenerator: Send + Sync {
    /// Role name the artifact is stored under in a subject
    fn role(&self) -> &str;

    /// Render one artifact for `object_id` from its record
    fn generate(
        &self,
        record: &ObjectRecord,
        object_id: &ObjectId,
    ) -> Result<MediaArtifact, GenerateError>;
}

/// Payload of a generated artifact
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    /// Rendered image and the format it is encoded to
    Image { pixels: GrayImage, format: ImageFormat },
    /// Structured document, saved as JSON
    Document(serde_json::Value),
}

/// Output of one media generator, held in memory until the subject is saved
#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtifact {
    role: String,
    content: ArtifactContent,
}

impl MediaArtifact {
    pub fn image(role: impl Into<String>, pixels: GrayImage, format: ImageFormat) -> Self {
        Self {
            role: role.into(),
            content: ArtifactContent::Image { pixels, format },
        }
    }

    pub fn document(role: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            role: role.into(),
            content: ArtifactContent::Document(document),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn content(&self) -> &ArtifactContent {
        &self.content
    }

    pub(crate) fn set_role(&mut self, role: &str) {
        if self.role != role {
            self.role = role.to_string();
        }
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match &self.content {
            ArtifactContent::Image { format, .. } => {
                format.extensions_str().first().copied().unwrap_or("img")
            }
            ArtifactContent::Document(_) => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match &self.content {
            ArtifactContent::Image { format, .. } => format.to_mime_type(),
            ArtifactContent::Document(_) => "application/json",
        }
    }

    /// Encode to the bytes that end up on disk
    pub fn encode(&self) -> Result<Vec<u8>, GenerateError> {
        match &self.content {
            ArtifactContent::Image { pixels, format } => {
                let mut bytes = Vec::new();
                pixels.write_to(&mut Cursor::new(&mut bytes), *format)?;
                Ok(bytes)
            }
            ArtifactContent::Document(document) => Ok(serde_json::to_vec(document)?),
        }
    }
}

/// Role names `generator_for_role` understands
pub const KNOWN_ROLES: [&str; 5] = ["json", "triplet", "science", "template", "difference"];

/// Build the built-in generator for a role name using `config`
pub fn generator_for_role(
    role: &str,
    config: &Config,
) -> Result<Box<dyn MediaGenerator>, ConfigError> {
    let render = config.render;
    let generator: Box<dyn MediaGenerator> = match role {
        "json" => Box::new(JsonLocation::from_config(&config.lightcurve)),
        "triplet" => Box::new(TripletImageLocation::new(render)),
        "science" => Box::new(PanelImageLocation::new(Panel::Science, render)),
        "template" => Box::new(PanelImageLocation::new(Panel::Template, render)),
        "difference" => Box::new(PanelImageLocation::new(Panel::Difference, render)),
        other => return Err(ConfigError::UnknownRole(other.to_string())),
    };
    Ok(generator)
}

/// Build the generators named in `config.generators`, in order
pub fn generators_from_config(config: &Config) -> Result<Vec<Box<dyn MediaGenerator>>, ConfigError> {
    config.render.validate()?;
    config
        .generators
        .iter()
        .map(|role| generator_for_role(role.trim(), config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_artifact_encoding() {
        let artifact = MediaArtifact::document("json", json!({"data": []}));
        assert_eq!(artifact.extension(), "json");
        assert_eq!(artifact.mime_type(), "application/json");
        assert_eq!(artifact.encode().unwrap(), br#"{"data":[]}"#.to_vec());
    }

    #[test]
    fn test_image_artifact_encodes_png() {
        let artifact = MediaArtifact::image("science", GrayImage::new(3, 2), ImageFormat::Png);
        assert_eq!(artifact.extension(), "png");
        assert_eq!(artifact.mime_type(), "image/png");

        let bytes = artifact.encode().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn test_generator_for_role_uses_role_names() {
        let config = Config::default();
        for role in KNOWN_ROLES {
            assert_eq!(generator_for_role(role, &config).unwrap().role(), role);
        }
        assert!(matches!(
            generator_for_role("spectrum", &config),
            Err(ConfigError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_generators_from_config_keeps_order() {
        let config = Config {
            generators: vec!["json".into(), "difference".into()],
            ..Config::default()
        };
        let roles: Vec<String> = generators_from_config(&config)
            .unwrap()
            .iter()
            .map(|g| g.role().to_string())
            .collect();
        assert_eq!(roles, vec!["json", "difference"]);
    }
}
