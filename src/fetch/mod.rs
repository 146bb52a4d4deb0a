//! Data fetching
//!
//! This module handles:
//! - The `DataFetcher` contract the subject generator pulls records through
//! - Reading records saved as JSON files (local.rs)
//! - Translating alert-broker payloads into records (lasair.rs)
//! - Decoding FITS cutouts (fits.rs)
//! - Talking to the broker over HTTP (http.rs)
//!
//! Fetchers never retry. A failed call is reported once and the caller
//! decides what to do with it.

pub mod fits;
pub mod http;
pub mod lasair;
pub mod local;

pub use http::HttpBrokerClient;
pub use lasair::{BrokerClient, LasairFetcher};
pub use local::JsonDirFetcher;

use crate::error::FetchError;
use crate::record::{ObjectId, ObjectRecord};

/// Anything that can turn an object ID into a populated record
pub trait DataFetcher {
    fn fetch(&self, object_id: &ObjectId) -> Result<ObjectRecord, FetchError>;
}

impl<F> DataFetcher for F
where
    F: Fn(&ObjectId) -> Result<ObjectRecord, FetchError>,
{
    fn fetch(&self, object_id: &ObjectId) -> Result<ObjectRecord, FetchError> {
        self(object_id)
    }
}
