use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Devices: GET /v1/devices
//
// Every entry carries the station identity plus its most recent reading:
//
//   { "macAddress": "00:0E:C6:20:0F:7B",
//     "info": { "name": "Backyard", "location": "Home" },
//     "lastData": { "dateutc": 1700000000000, "tempf": 52.3, ... } }
//
// `info` and `lastData` may both be missing or null.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Hardware address, unique per account.
    pub mac_address: String,

    #[serde(default)]
    pub info: Option<DeviceInfo>,

    /// Latest reading embedded by the devices endpoint.
    #[serde(default)]
    pub last_data: Option<Reading>,
}

impl Device {
    pub fn name(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.name.as_deref())
    }

    pub fn location(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.location.as_deref())
    }
}

/// One element of the devices list. A malformed element only costs that
/// device; the rest of the list is still usable.
pub type DeviceEntry = Result<Device, InvalidDevice>;

#[derive(Debug, Error)]
#[error("malformed device entry #{index} ({}): {source}", .mac_address.as_deref().unwrap_or("no macAddress"))]
pub struct InvalidDevice {
    /// Position in the upstream list.
    pub index: usize,
    pub mac_address: Option<String>,
    #[source]
    pub source: serde_json::Error,
}

impl Device {
    /// Decode one raw element of the devices list.
    pub fn from_entry(index: usize, entry: Value) -> DeviceEntry {
        let mac_address = entry
            .get("macAddress")
            .and_then(Value::as_str)
            .map(str::to_owned);
        serde_json::from_value(entry).map_err(|source| InvalidDevice {
            index,
            mac_address,
            source,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub location: Option<String>,
}

// ---------------------------------------------------------------------------
// Reading
//
// Upstream adds sensor fields over time and omits the ones a station lacks, so
// a reading is kept as the raw JSON object. Typed access goes through the
// accessors below; nothing is dropped on the way to the store.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(Map<String, Value>);

impl Reading {
    /// Vendor acquisition timestamp in epoch milliseconds.
    pub fn dateutc(&self) -> Option<i64> {
        let v = self.0.get("dateutc")?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    /// Human-readable timestamp as sent by upstream.
    pub fn date(&self) -> Option<&str> {
        self.0.get("date").and_then(Value::as_str)
    }

    /// Numeric field by upstream key. Missing keys, nulls and non-numeric
    /// values all yield `None`; a present `0` stays `Some(0.0)`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

// ---------------------------------------------------------------------------
// Device samples: GET /v1/devices/{macAddress}
// ---------------------------------------------------------------------------

/// Bounds for a device sample query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleQuery {
    /// Anchor timestamp (epoch ms). Sent as upstream's `endDate`; samples are
    /// returned counting back from it. `None` means "now".
    pub since: Option<i64>,

    /// Maximum number of samples, 1..=288.
    pub limit: u32,
}

impl Default for SampleQuery {
    fn default() -> Self {
        Self { since: None, limit: 1 }
    }
}

/// Upstream caps a single request at one day of 5-minute samples.
pub const MAX_SAMPLE_LIMIT: u32 = 288;

// ---------------------------------------------------------------------------
// Error body
//
// Failures come back as `{ "error": "..." }` or `{ "message": "..." }`.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.is_empty())
    }
}
