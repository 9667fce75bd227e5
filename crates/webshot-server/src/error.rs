//! Error types for the screenshot server

use crate::types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use std::fmt;
use webshot_cache::CacheError;
use webshot_render::RenderError;

/// Startup and lifecycle failures
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Cache(CacheError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Cache(err) => write!(f, "Cache error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Cache(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<CacheError> for ServerError {
    fn from(err: CacheError) -> Self {
        ServerError::Cache(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Client-facing failure, rendered as `{error, message}` JSON.
///
/// Server-side failures never carry internal detail in `message`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request", message)
    }

    pub fn missing_url() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Missing required parameter: url",
            "Please provide a URL in the query parameter",
        )
    }

    pub fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "Not found",
            "The requested endpoint does not exist",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Validation(msg) => {
                ApiError::new(StatusCode::BAD_REQUEST, "Invalid URL", msg)
            }
            RenderError::NameResolution(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "Invalid URL",
                "The provided URL could not be resolved",
            ),
            RenderError::ConnectionRefused(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "Connection refused",
                "Could not connect to the provided URL",
            ),
            RenderError::NavigationTimeout(_) => ApiError::new(
                StatusCode::REQUEST_TIMEOUT,
                "Request timeout",
                "The website took too long to load",
            ),
            RenderError::EngineAcquisition(_)
            | RenderError::Navigation(_)
            | RenderError::Capture(_)
            | RenderError::Internal(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "Failed to capture screenshot",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}
