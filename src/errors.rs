use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Errors surfaced by handlers, integrations and the pipeline.
#[derive(Debug, Clone)]
pub enum AppError {
    NotFound(String),
    /// Invalid local input, rejected before any upstream call.
    BadRequest(String),
    /// A third-party API (GoHighLevel, Instantly, OpenAI, ...) failed or answered badly.
    ExternalApiError(String),
    InternalError(String),
    Unauthorized(String),
    /// The integration needed to serve the request has no credentials.
    /// Holds the environment variable to set.
    NotConfigured(String),
    /// An error annotated with what the caller was doing.
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl AppError {
    /// Innermost error, skipping any context layers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.root() {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::WithContext { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to the caller. Upstream and internal details stay in the logs.
    fn public_message(&self) -> String {
        match self.root() {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => msg.clone(),
            AppError::ExternalApiError(_) => "External service error".to_string(),
            AppError::Unauthorized(_) => "Unauthorized".to_string(),
            AppError::NotConfigured(var) => format!("{} is not configured", var),
            AppError::InternalError(_) | AppError::WithContext { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotConfigured(var) => write!(f, "Not configured: {}", var),
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Logs at a level matching the severity, then renders `{"error": ..}`.
    fn into_response(self) -> Response {
        let status = self.status();
        match self.root() {
            AppError::Unauthorized(_) | AppError::NotConfigured(_) => {
                tracing::warn!("⚠️  {}", self)
            }
            AppError::NotFound(_) | AppError::BadRequest(_) => tracing::debug!("{}", self),
            _ => tracing::error!("❌ {}", self),
        }

        let body = Json(json!({
            "error": self.public_message(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ExternalApiError(format!("Request timed out: {}", err))
        } else {
            AppError::ExternalApiError(err.to_string())
        }
    }
}

/// `anyhow::Context`-style annotation for `Result<T, AppError>`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Lazy variant of [`ResultExt::context`].
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
