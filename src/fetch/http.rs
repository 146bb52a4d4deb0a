//! HTTP transport to the alert broker
//!
//! Blocking client; the subject generator pulls one object at a time so
//! there is nothing to overlap. No retries: a failed request surfaces as a
//! `FetchError` for that object only.

use reqwest::blocking::{Client, Response};
use reqwest::{header, StatusCode};
use std::time::Duration;

use super::lasair::{BrokerClient, BrokerObject};
use crate::config::BrokerConfig;
use crate::error::FetchError;
use crate::record::ObjectId;

const USER_AGENT: &str = concat!("alert-subjects/", env!("CARGO_PKG_VERSION"));

pub struct HttpBrokerClient {
    client: Client,
    base_url: String,
}

impl HttpBrokerClient {
    pub fn new(config: &BrokerConfig) -> reqwest::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        if let Some(token) = config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            if let Ok(value) = header::HeaderValue::from_str(&format!("Token {}", token.trim())) {
                headers.insert(header::AUTHORIZATION, value);
            } else {
                tracing::warn!("Broker token contains invalid header characters, ignoring it");
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn broker_error(object_id: &ObjectId, reason: impl ToString) -> FetchError {
        FetchError::Broker {
            object_id: object_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Pass successful responses through, map the rest to fetch errors
    fn check_status(
        object_id: &ObjectId,
        response: Response,
        request: Request<'_>,
    ) -> Result<Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(status_error(object_id, status, &body, request))
    }
}

/// What a request was for
#[derive(Debug, Clone, Copy)]
enum Request<'a> {
    Object,
    Cutout(&'a str),
}

/// Error for a non-success response
///
/// Only the object query can say an object is unknown. A missing cutout is
/// a broker failure for an object that exists.
fn status_error(object_id: &ObjectId, status: StatusCode, body: &str, request: Request<'_>) -> FetchError {
    let snippet: String = body.chars().take(200).collect();
    match request {
        Request::Object
            if status == StatusCode::NOT_FOUND
                || (status == StatusCode::BAD_REQUEST
                    && body.to_lowercase().contains("not found")) =>
        {
            FetchError::NotFound {
                object_id: object_id.to_string(),
            }
        }
        Request::Object => HttpBrokerClient::broker_error(object_id, format!("HTTP {status}: {snippet}")),
        Request::Cutout(url) => {
            HttpBrokerClient::broker_error(object_id, format!("cutout {url}: HTTP {status}: {snippet}"))
        }
    }
}

impl BrokerClient for HttpBrokerClient {
    fn object(&self, object_id: &ObjectId) -> Result<BrokerObject, FetchError> {
        let url = format!("{}/object/", self.base_url);
        tracing::debug!(object_id = %object_id, url = %url, "Querying broker");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("objectId", object_id.as_str()),
                ("lasair_added", "true"),
                ("format", "json"),
            ])
            .send()
            .map_err(|e| Self::broker_error(object_id, e))?;

        Self::check_status(object_id, response, Request::Object)?
            .json::<BrokerObject>()
            .map_err(|e| FetchError::Malformed {
                object_id: object_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn cutout(&self, object_id: &ObjectId, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(object_id = %object_id, url = %url, "Downloading cutout");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Self::broker_error(object_id, e))?;

        let bytes = Self::check_status(object_id, response, Request::Cutout(url))?
            .bytes()
            .map_err(|e| Self::broker_error(object_id, e))?;
        Ok(bytes.to_vec())
    }
}
