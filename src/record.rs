//! Broker data for one object
//!
//! These structs represent the data model that flows from the
//! data fetcher into the media generators. A record is built once per
//! object ID, read by every generator, and dropped afterwards.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of one alert object within the broker
///
/// Brokers hand out either strings or integers; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty ID can never be resolved by a broker
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// Version of the ID that is safe to embed in a file name
    pub fn file_stem(&self) -> String {
        file_safe(&self.0)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`
pub(crate) fn file_safe(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

// serde_json writes NaN as null; read it back as NaN
fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn pixels_nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
    let pixels = Vec::<Option<f32>>::deserialize(deserializer)?;
    Ok(pixels.into_iter().map(|p| p.unwrap_or(f32::NAN)).collect())
}

/// One photometric measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation time (MJD)
    pub time: f64,
    /// Flux or magnitude, per broker convention
    #[serde(deserialize_with = "nan_if_null")]
    pub value: f64,
    /// Filter band (e.g. "g", "r")
    pub band: String,
    /// One-sigma uncertainty on `value`
    #[serde(deserialize_with = "nan_if_null")]
    pub uncertainty: f64,
}

impl Observation {
    pub fn new(time: f64, value: f64, band: impl Into<String>, uncertainty: f64) -> Self {
        Self {
            time,
            value,
            band: band.into(),
            uncertainty,
        }
    }
}

/// Which cutout of a triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Science,
    Template,
    Difference,
}

impl Panel {
    /// Composite order for triplet images
    pub const ALL: [Panel; 3] = [Panel::Science, Panel::Template, Panel::Difference];

    /// Role name used for single-panel media
    pub fn role(&self) -> &'static str {
        match self {
            Panel::Science => "science",
            Panel::Template => "template",
            Panel::Difference => "difference",
        }
    }

    /// Key the broker uses for this cutout in its image URL groups
    pub fn broker_key(&self) -> &'static str {
        match self {
            Panel::Science => "Science",
            Panel::Template => "Template",
            Panel::Difference => "Difference",
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role())
    }
}

/// A 2-D cutout, stored row-major with the bottom row first (FITS order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub width: u32,
    pub height: u32,
    #[serde(deserialize_with = "pixels_nan_if_null")]
    pub pixels: Vec<f32>,
}

impl Stamp {
    /// Returns None when the pixel count does not match the dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Stamp with every pixel set to `value`
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Deserialized stamps are not checked on the way in
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize
    }

    /// Pixel at column `x` of row `y`, counted from the bottom
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Science, template and difference cutouts for one detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTriplet {
    /// Detection time (MJD) used to pick the most recent triplet
    pub time: f64,
    /// Broker identifier of the detection, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub science: Stamp,
    pub template: Stamp,
    pub difference: Stamp,
}

impl ImageTriplet {
    pub fn panel(&self, panel: Panel) -> &Stamp {
        match panel {
            Panel::Science => &self.science,
            Panel::Template => &self.template,
            Panel::Difference => &self.difference,
        }
    }

    /// Shared dimensions of the three stamps, or a description of the mismatch
    pub fn shared_dimensions(&self) -> Result<(u32, u32), String> {
        for panel in Panel::ALL {
            let stamp = self.panel(panel);
            if !stamp.is_consistent() {
                return Err(format!(
                    "{} stamp has {} pixels for {}x{}",
                    panel,
                    stamp.pixels.len(),
                    stamp.width,
                    stamp.height
                ));
            }
        }
        let dims = self.science.dimensions();
        for panel in [Panel::Template, Panel::Difference] {
            let other = self.panel(panel).dimensions();
            if other != dims {
                return Err(format!(
                    "science is {}x{} but {} is {}x{}",
                    dims.0, dims.1, panel, other.0, other.1
                ));
            }
        }
        Ok(dims)
    }
}

/// Everything the broker returned for one object ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub object_id: ObjectId,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub triplets: Vec<ImageTriplet>,
}

impl ObjectRecord {
    pub fn new(object_id: impl Into<ObjectId>) -> Self {
        Self {
            object_id: object_id.into(),
            observations: Vec::new(),
            triplets: Vec::new(),
        }
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observations.push(observation);
        self
    }

    pub fn with_triplet(mut self, triplet: ImageTriplet) -> Self {
        self.triplets.push(triplet);
        self
    }

    /// Triplet with the greatest detection time; ties go to the later one
    pub fn latest_triplet(&self) -> Option<&ImageTriplet> {
        self.triplets
            .iter()
            .reduce(|best, t| if t.time >= best.time { t } else { best })
    }
}
