//! Alert-broker adapter
//!
//! Translates the broker's object payload into an `ObjectRecord`:
//! - `diaSourcesList` rows become observations
//! - `lasairData.imageUrls` groups become image triplets, with each cutout
//!   downloaded through the client and decoded from FITS
//!
//! The transport is behind `BrokerClient` so the adapter can be driven by
//! the HTTP client in production and by canned payloads in tests.

use serde::{Deserialize, Deserializer};

use super::fits;
use super::DataFetcher;
use crate::error::FetchError;
use crate::record::{ImageTriplet, ObjectId, ObjectRecord, Observation, Panel, Stamp};

/// Transport to the alert broker
pub trait BrokerClient {
    /// Object payload for `object_id`; `FetchError::NotFound` if unknown
    fn object(&self, object_id: &ObjectId) -> Result<BrokerObject, FetchError>;

    /// Raw bytes of one cutout file
    fn cutout(&self, object_id: &ObjectId, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Broker identifiers arrive as JSON numbers or strings
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Uint(u64),
        Text(String),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Int(v) => v.to_string(),
        Id::Uint(v) => v.to_string(),
        Id::Text(v) => v,
    })
}

/// One detection row
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaSource {
    #[serde(deserialize_with = "id_string")]
    pub dia_source_id: String,
    pub midpoint_mjd_tai: f64,
    #[serde(default)]
    pub psf_flux: Option<f64>,
    #[serde(default)]
    pub psf_flux_err: Option<f64>,
    pub band: String,
}

/// Cutout URLs for one detection
#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrls {
    #[serde(rename = "diaSourceId", deserialize_with = "id_string")]
    pub dia_source_id: String,
    #[serde(rename = "Science")]
    pub science: Option<String>,
    #[serde(rename = "Template")]
    pub template: Option<String>,
    #[serde(rename = "Difference")]
    pub difference: Option<String>,
}

impl ImageUrls {
    pub fn url(&self, panel: Panel) -> Option<&str> {
        match panel {
            Panel::Science => self.science.as_deref(),
            Panel::Template => self.template.as_deref(),
            Panel::Difference => self.difference.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LasairData {
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Vec<ImageUrls>,
}

/// The parts of the broker's object payload this crate reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerObject {
    #[serde(rename = "diaSourcesList", default)]
    pub dia_sources: Vec<DiaSource>,
    #[serde(rename = "lasairData", default)]
    pub lasair_data: LasairData,
}

/// `DataFetcher` on top of a broker client
#[derive(Debug, Clone)]
pub struct LasairFetcher<C> {
    client: C,
    latest_only: bool,
}

impl<C: BrokerClient> LasairFetcher<C> {
    /// Downloads only the most recent triplet by default
    pub fn new(client: C) -> Self {
        Self {
            client,
            latest_only: true,
        }
    }

    /// Download every triplet instead of only the most recent one
    pub fn all_triplets(mut self) -> Self {
        self.latest_only = false;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn download_triplet(
        &self,
        object_id: &ObjectId,
        urls: &ImageUrls,
        time: f64,
    ) -> Result<Option<ImageTriplet>, FetchError> {
        let mut stamps: Vec<Stamp> = Vec::with_capacity(3);
        for panel in Panel::ALL {
            let Some(url) = urls.url(panel) else {
                tracing::warn!(
                    object_id = %object_id,
                    dia_source_id = %urls.dia_source_id,
                    "No {} cutout URL, skipping triplet",
                    panel
                );
                return Ok(None);
            };
            let bytes = self.client.cutout(object_id, url)?;
            let stamp = fits::decode_image(&bytes).map_err(|e| FetchError::Malformed {
                object_id: object_id.to_string(),
                reason: format!("{} cutout {}: {}", panel, url, e),
            })?;
            stamps.push(stamp);
        }

        let mut stamps = stamps.into_iter();
        let (Some(science), Some(template), Some(difference)) =
            (stamps.next(), stamps.next(), stamps.next())
        else {
            return Ok(None);
        };
        Ok(Some(ImageTriplet {
            time,
            source_id: Some(urls.dia_source_id.clone()),
            science,
            template,
            difference,
        }))
    }
}

impl<C: BrokerClient> DataFetcher for LasairFetcher<C> {
    fn fetch(&self, object_id: &ObjectId) -> Result<ObjectRecord, FetchError> {
        tracing::debug!(object_id = %object_id, "Fetching broker object");
        let payload = self.client.object(object_id)?;

        let observations: Vec<Observation> = payload
            .dia_sources
            .iter()
            .map(|s| {
                Observation::new(
                    s.midpoint_mjd_tai,
                    s.psf_flux.unwrap_or(f64::NAN),
                    s.band.clone(),
                    s.psf_flux_err.unwrap_or(f64::NAN),
                )
            })
            .collect();
        if observations.is_empty() {
            return Err(FetchError::Malformed {
                object_id: object_id.to_string(),
                reason: "object has no observations".to_string(),
            });
        }

        let detection_time = |source_id: &str| {
            payload
                .dia_sources
                .iter()
                .find(|s| s.dia_source_id == source_id)
                .map(|s| s.midpoint_mjd_tai)
                .unwrap_or(f64::NEG_INFINITY)
        };

        let mut groups: Vec<(&ImageUrls, f64)> = payload
            .lasair_data
            .image_urls
            .iter()
            .map(|urls| (urls, detection_time(&urls.dia_source_id)))
            .collect();
        if self.latest_only {
            let latest = groups
                .iter()
                .copied()
                .reduce(|best, g| if g.1 >= best.1 { g } else { best });
            groups = latest.into_iter().collect();
        }

        let mut record = ObjectRecord::new(object_id.clone());
        record.observations = observations;
        for (urls, time) in groups {
            if let Some(triplet) = self.download_triplet(object_id, urls, time)? {
                record.triplets.push(triplet);
            }
        }

        tracing::debug!(
            object_id = %object_id,
            observations = record.observations.len(),
            triplets = record.triplets.len(),
            "Parsed broker object"
        );
        Ok(record)
    }
}
