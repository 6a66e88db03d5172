use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use utoipa::OpenApi;

use super::{
    dto::{EndpointNotFound, ErrorResponse, HealthConfig, HealthResponse, WeatherRecordDto},
    errors::AppError,
    AppState, AVAILABLE_ENDPOINTS,
};
use crate::db::models::Measurements;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Most recent reading across all devices. The device address is omitted and
/// the location replaced by the configured display location, if any.
#[utoipa::path(
    get,
    path = "/api/latest",
    responses(
        (status = 200, description = "Latest stored reading", body = WeatherRecordDto),
        (status = 404, description = "Nothing recorded yet", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "weather"
)]
pub async fn get_latest(
    State(state): State<AppState>,
) -> Result<Json<WeatherRecordDto>, AppError> {
    let record = state.store.latest().await?.ok_or_else(|| {
        AppError::NotFound(
            "No weather data has been recorded yet. Please wait for the first poll cycle."
                .to_owned(),
        )
    })?;

    let dto = WeatherRecordDto::from(record).redacted(state.location_override.as_deref());
    Ok(Json(dto))
}

/// Most recent reading for one device.
#[utoipa::path(
    get,
    path = "/api/latest/{mac_address}",
    params(
        ("mac_address" = String, Path, description = "Device hardware address"),
    ),
    responses(
        (status = 200, description = "Latest stored reading for the device", body = WeatherRecordDto),
        (status = 404, description = "No reading for this device", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "weather"
)]
pub async fn get_latest_for_device(
    State(state): State<AppState>,
    Path(mac_address): Path<String>,
) -> Result<Json<WeatherRecordDto>, AppError> {
    let record = state
        .store
        .latest_for_device(&mac_address)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No weather data found for device {mac_address}"))
        })?;

    Ok(Json(record.into()))
}

/// Liveness plus the active poll interval. Always `200 OK`.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        timestamp: Utc::now(),
        config: HealthConfig {
            poll_interval_minutes: state.poll_interval_minutes,
        },
    })
}

pub async fn not_found() -> (StatusCode, Json<EndpointNotFound>) {
    (
        StatusCode::NOT_FOUND,
        Json(EndpointNotFound {
            error: "Not found".to_owned(),
            message: "The requested endpoint does not exist".to_owned(),
            available_endpoints: AVAILABLE_ENDPOINTS.iter().map(|e| (*e).to_owned()).collect(),
        }),
    )
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_latest, get_latest_for_device, health),
    components(schemas(
        WeatherRecordDto,
        Measurements,
        ErrorResponse,
        HealthResponse,
        HealthConfig
    )),
    tags(
        (name = "weather", description = "Stored weather readings"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Weather Relay API",
        version = "0.1.0",
        description = "Latest readings from polled Ambient Weather stations"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
