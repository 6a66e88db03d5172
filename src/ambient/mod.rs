pub mod models;
pub mod rate_gate;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;

use self::{
    models::{Device, DeviceEntry, ErrorBody, Reading, SampleQuery, MAX_SAMPLE_LIMIT},
    rate_gate::RateGate,
};

pub const DEFAULT_BASE_URL: &str = "https://rt.ambientweather.net/v1";

/// Upstream allows one request per second per API key.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1000);

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AmbientError {
    #[error("authentication failed, check the application and API keys")]
    Authentication,

    #[error("rate limit exceeded, wait before making another request")]
    RateLimited,

    #[error("device {0} not found")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The request went out but no response came back.
    #[error("no response from Ambient Weather API: {0}")]
    Transport(#[source] reqwest::Error),

    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    Client(String),

    #[error("failed to decode Ambient Weather response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// WeatherApi
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Every device on the account, each with its latest reading embedded,
    /// in upstream order. Entries that do not decode are returned as errors
    /// in place.
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, AmbientError>;

    /// Historical samples for one device, newest first.
    async fn fetch_device_samples(
        &self,
        mac_address: &str,
        query: SampleQuery,
    ) -> Result<Vec<Reading>, AmbientError>;
}

// ---------------------------------------------------------------------------
// AmbientClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AmbientClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: Url,
    application_key: String,
    api_key: String,
    gate: RateGate,
}

/// Which kind of endpoint a response came from; 404 only means "unknown
/// device" on device-scoped calls.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Account,
    Device(&'a str),
}

impl AmbientClient {
    pub fn new(config: &Config) -> Result<Self, AmbientError> {
        Self::from_parts(
            &config.ambient_base_url,
            &config.application_key,
            &config.api_key,
            RateGate::new(MIN_REQUEST_INTERVAL),
        )
    }

    pub fn from_parts(
        base_url: &str,
        application_key: &str,
        api_key: &str,
        gate: RateGate,
    ) -> Result<Self, AmbientError> {
        if application_key.is_empty() || api_key.is_empty() {
            return Err(AmbientError::Client(
                "application key and API key are required".to_owned(),
            ));
        }

        let base_url = Url::parse(base_url)
            .map_err(|e| AmbientError::Client(format!("invalid base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AmbientError::Client(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AmbientError::Client(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                application_key: application_key.to_owned(),
                api_key: api_key.to_owned(),
                gate,
            }),
        })
    }

    /// Build `{base}/{segments..}?applicationKey=..&apiKey=..&{params..}`.
    fn endpoint(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url, AmbientError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AmbientError::Client("base URL cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("applicationKey", &self.inner.application_key)
                .append_pair("apiKey", &self.inner.api_key);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Rate-gated GET. Every outbound call goes through here.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        scope: Scope<'_>,
    ) -> Result<T, AmbientError> {
        self.inner.gate.acquire().await;

        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(status_error(status, &body, scope));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AmbientError::Transport(e.without_url()))?;

        serde_json::from_slice(&bytes).map_err(AmbientError::InvalidResponse)
    }
}

#[async_trait]
impl WeatherApi for AmbientClient {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, AmbientError> {
        let url = self.endpoint(&["devices"], &[])?;
        info!("Fetching devices from Ambient Weather API");

        let raw: Vec<Value> = self.get_json(url, Scope::Account).await?;
        let entries: Vec<DeviceEntry> = raw
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Device::from_entry(index, entry))
            .collect();

        let malformed = entries.iter().filter(|e| e.is_err()).count();
        if malformed > 0 {
            warn!(malformed, "Devices list contains malformed entries");
        }
        info!(count = entries.len(), "Fetched devices");
        Ok(entries)
    }

    async fn fetch_device_samples(
        &self,
        mac_address: &str,
        query: SampleQuery,
    ) -> Result<Vec<Reading>, AmbientError> {
        let limit = query.limit;
        if !(1..=MAX_SAMPLE_LIMIT).contains(&limit) {
            return Err(AmbientError::Client(format!(
                "sample limit {limit} is outside 1..={MAX_SAMPLE_LIMIT}"
            )));
        }
        let mut params = vec![("limit", limit.to_string())];
        if let Some(since) = query.since {
            params.push(("endDate", since.to_string()));
        }

        let url = self.endpoint(&["devices", mac_address], &params)?;
        debug!(mac_address = %mac_address, limit, since = ?query.since, "Fetching device samples");

        let samples: Option<Vec<Reading>> =
            self.get_json(url, Scope::Device(mac_address)).await?;
        let samples = samples.unwrap_or_default();

        info!(mac_address = %mac_address, count = samples.len(), "Fetched device samples");
        Ok(samples)
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a `send()` failure. The URL carries credentials, so it is stripped.
fn classify_send_error(e: reqwest::Error) -> AmbientError {
    if e.is_builder() {
        AmbientError::Client(e.without_url().to_string())
    } else {
        AmbientError::Transport(e.without_url())
    }
}

fn status_error(status: StatusCode, body: &[u8], scope: Scope<'_>) -> AmbientError {
    match (status, scope) {
        (StatusCode::UNAUTHORIZED, _) => AmbientError::Authentication,
        (StatusCode::TOO_MANY_REQUESTS, _) => AmbientError::RateLimited,
        (StatusCode::NOT_FOUND, Scope::Device(mac_address)) => {
            AmbientError::NotFound(mac_address.to_owned())
        }
        _ => {
            let message = serde_json::from_slice::<ErrorBody>(body)
                .ok()
                .and_then(ErrorBody::into_message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_owned());
            AmbientError::Upstream {
                status: status.as_u16(),
                message,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
