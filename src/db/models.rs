use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;

use crate::ambient::models::Reading;

/// Format version written alongside every `raw_data` blob.
pub const RAW_PAYLOAD_VERSION: i16 = 1;

/// The modeled sensor columns of `weather_data`.
///
/// Always derived from the raw payload with [`Measurements::project`]; each
/// column is `NULL` when the payload lacks the field.
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Measurements {
    /// Wind direction, degrees.
    pub winddir: Option<f64>,
    /// Wind speed, mph.
    pub windspeedmph: Option<f64>,
    pub windgustmph: Option<f64>,
    pub maxdailygust: Option<f64>,
    pub windgustdir: Option<f64>,
    pub winddir_avg2m: Option<f64>,
    pub windspdmph_avg2m: Option<f64>,
    pub winddir_avg10m: Option<f64>,
    pub windspdmph_avg10m: Option<f64>,
    /// Outdoor temperature, °F.
    pub tempf: Option<f64>,
    /// Indoor temperature, °F.
    pub tempinf: Option<f64>,
    pub feelslike: Option<f64>,
    pub dewpoint: Option<f64>,
    /// Outdoor relative humidity, %.
    pub humidity: Option<f64>,
    pub humidityin: Option<f64>,
    /// Relative pressure, inHg.
    pub baromrelin: Option<f64>,
    /// Absolute pressure, inHg.
    pub baromabsin: Option<f64>,
    pub hourlyrainin: Option<f64>,
    pub dailyrainin: Option<f64>,
    pub weeklyrainin: Option<f64>,
    pub monthlyrainin: Option<f64>,
    pub yearlyrainin: Option<f64>,
    /// Solar radiation, W/m².
    pub solarradiation: Option<f64>,
    pub uv: Option<f64>,
}

impl Measurements {
    pub fn project(reading: &Reading) -> Self {
        let n = |key: &str| reading.number(key);
        Self {
            winddir: n("winddir"),
            windspeedmph: n("windspeedmph"),
            windgustmph: n("windgustmph"),
            maxdailygust: n("maxdailygust"),
            windgustdir: n("windgustdir"),
            winddir_avg2m: n("winddir_avg2m"),
            windspdmph_avg2m: n("windspdmph_avg2m"),
            winddir_avg10m: n("winddir_avg10m"),
            windspdmph_avg10m: n("windspdmph_avg10m"),
            tempf: n("tempf"),
            tempinf: n("tempinf"),
            // Upstream camel-cases these two.
            feelslike: n("feelsLike"),
            dewpoint: n("dewPoint"),
            humidity: n("humidity"),
            humidityin: n("humidityin"),
            baromrelin: n("baromrelin"),
            baromabsin: n("baromabsin"),
            hourlyrainin: n("hourlyrainin"),
            dailyrainin: n("dailyrainin"),
            weeklyrainin: n("weeklyrainin"),
            monthlyrainin: n("monthlyrainin"),
            yearlyrainin: n("yearlyrainin"),
            solarradiation: n("solarradiation"),
            uv: n("uv"),
        }
    }
}

/// What `insert` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct InsertedRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of `weather_data`. Never updated after insert.
#[derive(Debug, Clone, FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub mac_address: String,
    pub device_name: Option<String>,
    pub device_location: Option<String>,
    /// Acquisition timestamp, epoch ms.
    pub dateutc: i64,
    pub date: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub measurements: Measurements,
    pub payload_version: i16,
    pub raw_data: Json<Value>,
}
