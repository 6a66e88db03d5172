use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::db::models::{Measurements, StoredRecord};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WeatherRecordDto {
    pub id: i64,
    /// Omitted from the account-wide latest response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub device_name: Option<String>,
    pub device_location: Option<String>,
    /// Acquisition timestamp, epoch ms.
    pub dateutc: i64,
    pub date: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub measurements: Measurements,
    /// Upstream payload exactly as received.
    #[schema(value_type = Object)]
    pub raw_data: Value,
}

impl From<StoredRecord> for WeatherRecordDto {
    fn from(r: StoredRecord) -> Self {
        Self {
            id: r.id,
            mac_address: Some(r.mac_address),
            device_name: r.device_name,
            device_location: r.device_location,
            dateutc: r.dateutc,
            date: r.date,
            created_at: r.created_at,
            measurements: r.measurements,
            raw_data: r.raw_data.0,
        }
    }
}

impl WeatherRecordDto {
    /// Public view: no hardware address, and the configured display location
    /// (if any) in place of the stored one.
    pub fn redacted(mut self, location_override: Option<&str>) -> Self {
        self.mac_address = None;
        if let Some(location) = location_override {
            self.device_location = Some(location.to_owned());
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub config: HealthConfig,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    pub poll_interval_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointNotFound {
    pub error: String,
    pub message: String,
    pub available_endpoints: Vec<String>,
}
