pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::db::ReadingStore;

use handlers::ApiDoc;

pub(crate) const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /api/latest",
    "GET /api/latest/{mac_address}",
    "GET /api-docs/openapi.json",
];

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    /// Display-only location for `GET /api/latest`.
    pub location_override: Option<String>,
    pub poll_interval_minutes: u64,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/health", get(handlers::health))
        .route("/api/latest", get(handlers::get_latest))
        .route(
            "/api/latest/{mac_address}",
            get(handlers::get_latest_for_device),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
        .fallback(handlers::not_found)
}
