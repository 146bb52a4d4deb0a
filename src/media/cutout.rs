//! Cutout image generators
//!
//! Renders the science, template and difference stamps of the most recent
//! triplet, either one panel per image or all three side by side.

use image::{imageops, imageops::FilterType, GrayImage, ImageFormat, Luma};

use super::normalize::{normalize_stamp, ClipRange};
use super::{MediaArtifact, MediaGenerator};
use crate::config::RenderConfig;
use crate::error::GenerateError;
use crate::record::{ImageTriplet, ObjectId, ObjectRecord, Panel};

/// Triplet to render, or the error naming the panel that was wanted
fn latest_triplet<'a>(
    record: &'a ObjectRecord,
    object_id: &ObjectId,
    panel: Panel,
) -> Result<&'a ImageTriplet, GenerateError> {
    let triplet = record
        .latest_triplet()
        .ok_or_else(|| GenerateError::InsufficientData {
            object_id: object_id.to_string(),
            panel,
        })?;

    triplet
        .shared_dimensions()
        .map_err(|detail| GenerateError::ShapeMismatch {
            object_id: object_id.to_string(),
            detail,
        })?;

    Ok(triplet)
}

/// Nearest-neighbour upscale, the stamps are only a few dozen pixels wide
pub fn upscale(img: GrayImage, scale: u32) -> GrayImage {
    if scale <= 1 {
        return img;
    }
    let (width, height) = img.dimensions();
    match (width.checked_mul(scale), height.checked_mul(scale)) {
        (Some(w), Some(h)) => imageops::resize(&img, w, h, FilterType::Nearest),
        // RenderConfig::validate keeps scale far below this
        _ => img,
    }
}

/// Normalize and scale one panel of a triplet
pub fn render_panel(triplet: &ImageTriplet, panel: Panel, render: &RenderConfig) -> GrayImage {
    let normalized = normalize_stamp(triplet.panel(panel), ClipRange::from(render));
    upscale(normalized, render.scale)
}

/// Place equally sized panels left to right with `border` pixels between them
pub fn compose(panels: &[GrayImage], border: u32, border_value: u8) -> GrayImage {
    let Some(first) = panels.first() else {
        return GrayImage::new(0, 0);
    };
    let (width, height) = first.dimensions();
    let count = panels.len() as u32;
    let total_width = width * count + border * (count - 1);

    let mut canvas = GrayImage::from_pixel(total_width, height, Luma([border_value]));
    for (i, panel) in panels.iter().enumerate() {
        let x = i as u32 * (width + border);
        imageops::replace(&mut canvas, panel, x as i64, 0);
    }
    canvas
}

/// A single panel of the most recent triplet
///
/// `PanelImageLocation::science`, `::template` and `::difference` are the
/// three stock variants.
#[derive(Debug, Clone)]
pub struct PanelImageLocation {
    panel: Panel,
    render: RenderConfig,
    format: ImageFormat,
}

impl PanelImageLocation {
    pub fn new(panel: Panel, render: RenderConfig) -> Self {
        Self {
            panel,
            render,
            format: ImageFormat::Png,
        }
    }

    pub fn science(render: RenderConfig) -> Self {
        Self::new(Panel::Science, render)
    }

    pub fn template(render: RenderConfig) -> Self {
        Self::new(Panel::Template, render)
    }

    pub fn difference(render: RenderConfig) -> Self {
        Self::new(Panel::Difference, render)
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }
}

impl MediaGenerator for PanelImageLocation {
    fn role(&self) -> &str {
        self.panel.role()
    }

    fn generate(
        &self,
        record: &ObjectRecord,
        object_id: &ObjectId,
    ) -> Result<MediaArtifact, GenerateError> {
        let triplet = latest_triplet(record, object_id, self.panel)?;
        let img = render_panel(triplet, self.panel, &self.render);

        tracing::debug!(
            object_id = %object_id,
            panel = %self.panel,
            width = img.width(),
            height = img.height(),
            "Rendered panel image"
        );
        Ok(MediaArtifact::image(self.role(), img, self.format))
    }
}

/// Science, template and difference side by side, separated by a border
#[derive(Debug, Clone)]
pub struct TripletImageLocation {
    panels: [Panel; 3],
    render: RenderConfig,
    format: ImageFormat,
}

impl TripletImageLocation {
    pub fn new(render: RenderConfig) -> Self {
        Self {
            panels: Panel::ALL,
            render,
            format: ImageFormat::Png,
        }
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }
}

impl MediaGenerator for TripletImageLocation {
    fn role(&self) -> &str {
        "triplet"
    }

    fn generate(
        &self,
        record: &ObjectRecord,
        object_id: &ObjectId,
    ) -> Result<MediaArtifact, GenerateError> {
        let triplet = latest_triplet(record, object_id, self.panels[0])?;
        let rendered: Vec<GrayImage> = self
            .panels
            .iter()
            .map(|&panel| render_panel(triplet, panel, &self.render))
            .collect();
        let img = compose(&rendered, self.render.border, self.render.border_value);

        tracing::debug!(
            object_id = %object_id,
            width = img.width(),
            height = img.height(),
            "Rendered triplet image"
        );
        Ok(MediaArtifact::image(self.role(), img, self.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::normalize::FLAT_LEVEL;
    use crate::media::ArtifactContent;
    use crate::record::{Observation, Stamp};

    fn render(scale: u32) -> RenderConfig {
        RenderConfig {
            scale,
            ..RenderConfig::default()
        }
    }

    fn uniform_record(value: f32) -> ObjectRecord {
        ObjectRecord::new("obj").with_triplet(ImageTriplet {
            time: 60000.0,
            source_id: None,
            science: Stamp::filled(5, 4, value),
            template: Stamp::filled(5, 4, value),
            difference: Stamp::filled(5, 4, value),
        })
    }

    fn pixels(artifact: &MediaArtifact) -> &GrayImage {
        match artifact.content() {
            ArtifactContent::Image { pixels, .. } => pixels,
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_triplet_uniform_panels_are_midpoint() {
        let generator = TripletImageLocation::new(render(1));
        let id = ObjectId::from("obj");
        let artifact = generator.generate(&uniform_record(7.0), &id).unwrap();
        let img = pixels(&artifact);

        let border = RenderConfig::default().border;
        assert_eq!(img.dimensions(), (5 * 3 + border * 2, 4));

        for i in 0..3 {
            let x0 = i * (5 + border);
            for x in x0..x0 + 5 {
                for y in 0..4 {
                    assert_eq!(img.get_pixel(x, y).0[0], FLAT_LEVEL);
                }
            }
        }
        // border columns between panels
        assert_eq!(img.get_pixel(5, 0).0[0], 255);
        assert_eq!(img.get_pixel(5 + border + 5, 3).0[0], 255);
    }

    #[test]
    fn test_triplet_panel_order() {
        let mut record = uniform_record(0.0);
        // science and difference are ramps, the template stays flat
        let ramp: Vec<f32> = (0..20).map(|v| v as f32).collect();
        record.triplets[0].science = Stamp::new(5, 4, ramp.clone()).unwrap();
        record.triplets[0].difference = Stamp::new(5, 4, ramp).unwrap();

        let generator = TripletImageLocation::new(render(1));
        let artifact = generator.generate(&record, &ObjectId::from("obj")).unwrap();
        let img = pixels(&artifact);
        let border = RenderConfig::default().border;

        let template_x = 5 + border;
        assert_eq!(img.get_pixel(template_x, 0).0[0], FLAT_LEVEL);
        assert_ne!(img.get_pixel(0, 0).0[0], img.get_pixel(0, 3).0[0]);
    }

    #[test]
    fn test_scale_applies_to_every_panel() {
        let generator = TripletImageLocation::new(render(3));
        let artifact = generator.generate(&uniform_record(1.0), &ObjectId::from("obj")).unwrap();
        let border = RenderConfig::default().border;
        assert_eq!(pixels(&artifact).dimensions(), (15 * 3 + border * 2, 12));
    }

    #[test]
    fn test_panel_without_triplet_is_insufficient_data() {
        let record = ObjectRecord::new("obj").with_observation(Observation::new(1.0, 2.0, "g", 0.1));
        let generator = PanelImageLocation::science(render(1));

        let err = generator.generate(&record, &ObjectId::from("obj")).unwrap_err();
        match err {
            GenerateError::InsufficientData { object_id, panel } => {
                assert_eq!(object_id, "obj");
                assert_eq!(panel, Panel::Science);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(TripletImageLocation::new(render(1))
            .generate(&record, &ObjectId::from("obj"))
            .is_err());
    }

    #[test]
    fn test_panel_variants_render_own_stamp() {
        let mut record = uniform_record(3.0);
        let ramp: Vec<f32> = (0..20).map(|v| v as f32).collect();
        record.triplets[0].difference = Stamp::new(5, 4, ramp).unwrap();
        let id = ObjectId::from("obj");

        let science = PanelImageLocation::science(render(1)).generate(&record, &id).unwrap();
        let difference = PanelImageLocation::difference(render(1)).generate(&record, &id).unwrap();

        assert_eq!(science.role(), "science");
        assert_eq!(difference.role(), "difference");
        assert!(pixels(&science).pixels().all(|p| p.0[0] == FLAT_LEVEL));
        assert!(pixels(&difference).pixels().any(|p| p.0[0] != FLAT_LEVEL));
        assert_eq!(PanelImageLocation::template(render(1)).panel(), Panel::Template);
    }

    #[test]
    fn test_shape_mismatch_reported() {
        let mut record = uniform_record(1.0);
        record.triplets[0].template = Stamp::filled(6, 4, 1.0);

        let err = TripletImageLocation::new(render(1))
            .generate(&record, &ObjectId::from("obj"))
            .unwrap_err();
        assert!(matches!(err, GenerateError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_compose_empty_is_empty_image() {
        assert_eq!(compose(&[], 2, 0).dimensions(), (0, 0));
    }
}
