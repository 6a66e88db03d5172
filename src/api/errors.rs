use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::dto::ErrorResponse;

#[derive(Debug)]
pub enum AppError {
    /// Nothing stored yet; the message explains what is missing.
    NotFound(String),
    /// Anything else. Details are logged, never returned.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "No weather data available".to_owned(),
                    message,
                },
            ),
            AppError::Internal(e) => {
                error!(error = %format!("{e:#}"), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal server error".to_owned(),
                        message: "Failed to fetch weather data".to_owned(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self::Internal(e.into())
    }
}
