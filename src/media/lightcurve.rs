//! Lightcurve documents
//!
//! Produces the JSON shape the crowdsourcing platform's lightcurve viewer
//! reads: one series per filter band, each with its points and display
//! options.
//!
//! ```json
//! {"data": [{"seriesData": [{"x": 60000.1, "y": 5.0, "band": "g", "err": 0.1}],
//!            "seriesOptions": {"color": "white", "glyph": "circle", "label": "Lightcurve"}}]}
//! ```

use indexmap::IndexMap;
use serde_json::{json, Value};

use super::{MediaArtifact, MediaGenerator};
use crate::config::LightcurveConfig;
use crate::error::GenerateError;
use crate::record::{ObjectId, ObjectRecord, Observation};

/// Label value that switches to per-band labels
const BAND_LABEL: &str = "band";

/// How each series is labelled
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesLabel {
    /// Same label on every series
    Fixed(String),
    /// The series' band name
    Band,
}

/// Color and glyph pairs, cycled across series
pub const DEFAULT_GLYPHS: [(&str, &str); 2] = [("white", "circle"), ("red", "square")];

/// Full observation sequence as a lightcurve document
#[derive(Debug, Clone)]
pub struct JsonLocation {
    label: SeriesLabel,
    glyphs: Vec<(String, String)>,
}

impl Default for JsonLocation {
    fn default() -> Self {
        Self::new(SeriesLabel::Fixed("Lightcurve".to_string()))
    }
}

impl JsonLocation {
    pub fn new(label: SeriesLabel) -> Self {
        Self {
            label,
            glyphs: DEFAULT_GLYPHS
                .iter()
                .map(|(color, glyph)| (color.to_string(), glyph.to_string()))
                .collect(),
        }
    }

    pub fn from_config(config: &LightcurveConfig) -> Self {
        if config.label == BAND_LABEL {
            Self::new(SeriesLabel::Band)
        } else {
            Self::new(SeriesLabel::Fixed(config.label.clone()))
        }
    }

    /// Replace the color/glyph cycle; an empty list keeps the current one
    pub fn with_glyphs(mut self, glyphs: Vec<(String, String)>) -> Self {
        if !glyphs.is_empty() {
            self.glyphs = glyphs;
        }
        self
    }

    /// Build the document for a set of observations
    pub fn document(&self, observations: &[Observation]) -> Value {
        let mut sorted: Vec<&Observation> = observations.iter().collect();
        sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut bands: IndexMap<&str, Vec<&Observation>> = IndexMap::new();
        for obs in sorted {
            bands.entry(obs.band.as_str()).or_default().push(obs);
        }

        let series: Vec<Value> = bands
            .into_iter()
            .zip(self.glyphs.iter().cycle())
            .map(|((band, points), (color, glyph))| {
                let label = match &self.label {
                    SeriesLabel::Fixed(label) => label.as_str(),
                    SeriesLabel::Band => band,
                };
                let data: Vec<Value> = points
                    .iter()
                    .map(|p| json!({"x": p.time, "y": p.value, "band": p.band, "err": p.uncertainty}))
                    .collect();
                json!({
                    "seriesData": data,
                    "seriesOptions": {"color": color, "glyph": glyph, "label": label},
                })
            })
            .collect();

        json!({ "data": series })
    }
}

impl MediaGenerator for JsonLocation {
    fn role(&self) -> &str {
        "json"
    }

    fn generate(
        &self,
        record: &ObjectRecord,
        object_id: &ObjectId,
    ) -> Result<MediaArtifact, GenerateError> {
        tracing::debug!(
            object_id = %object_id,
            observations = record.observations.len(),
            "Generating lightcurve document"
        );
        Ok(MediaArtifact::document(self.role(), self.document(&record.observations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ArtifactContent;

    fn doc(artifact: &MediaArtifact) -> &Value {
        match artifact.content() {
            ArtifactContent::Document(value) => value,
            other => panic!("expected document, got {other:?}"),
        }
    }

    fn points(document: &Value) -> Vec<&Value> {
        document["data"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|series| series["seriesData"].as_array().unwrap())
            .collect()
    }

    #[test]
    fn test_single_point() {
        let record = ObjectRecord::new("obj").with_observation(Observation::new(100.0, 5.0, "g", 0.1));
        let artifact = JsonLocation::default().generate(&record, &ObjectId::from("obj")).unwrap();
        let document = doc(&artifact);

        let all = points(document);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], &json!({"x": 100.0, "y": 5.0, "band": "g", "err": 0.1}));
    }

    #[test]
    fn test_empty_observations_never_fail() {
        let record = ObjectRecord::new("obj");
        let artifact = JsonLocation::default().generate(&record, &ObjectId::from("obj")).unwrap();
        assert_eq!(doc(&artifact), &json!({"data": []}));
    }

    #[test]
    fn test_sorted_by_time_and_grouped_by_band() {
        let record = ObjectRecord::new("obj")
            .with_observation(Observation::new(30.0, 3.0, "g", 0.1))
            .with_observation(Observation::new(10.0, 1.0, "r", 0.1))
            .with_observation(Observation::new(20.0, 2.0, "g", 0.1))
            .with_observation(Observation::new(5.0, 0.5, "r", 0.1));
        let document = JsonLocation::default().document(&record.observations);

        let series = document["data"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        // r appears first once sorted by time
        let r_times: Vec<f64> = series[0]["seriesData"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["x"].as_f64().unwrap())
            .collect();
        assert_eq!(r_times, vec![5.0, 10.0]);
        assert_eq!(series[0]["seriesOptions"]["glyph"], "circle");
        assert_eq!(series[1]["seriesData"][0]["x"], 20.0);
        assert_eq!(series[1]["seriesOptions"]["color"], "red");
    }

    #[test]
    fn test_band_labels() {
        let config = LightcurveConfig {
            label: "band".to_string(),
        };
        let obs = [Observation::new(1.0, 1.0, "i", 0.2)];
        let document = JsonLocation::from_config(&config).document(&obs);
        assert_eq!(document["data"][0]["seriesOptions"]["label"], "i");
    }

    #[test]
    fn test_glyphs_cycle() {
        let obs: Vec<Observation> = ["u", "g", "r"]
            .iter()
            .enumerate()
            .map(|(i, band)| Observation::new(i as f64, 1.0, *band, 0.1))
            .collect();
        let document = JsonLocation::default().document(&obs);
        assert_eq!(document["data"][2]["seriesOptions"]["glyph"], "circle");
    }
}
