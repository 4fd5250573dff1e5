use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The resolver could not map the postcode and house number to an address.
    AddressNotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Error interacting with an external API outside of the fan-out.
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// The request context was cancelled (client went away).
    Cancelled,
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Returns true if this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Cancelled => true,
            AppError::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the error is the server's fault rather than the caller's.
    pub fn is_server_error(&self) -> bool {
        match self {
            AppError::ExternalApiError(_) | AppError::InternalError(_) => true,
            AppError::WithContext { source, .. } => source.is_server_error(),
            _ => false,
        }
    }

    /// Message safe to show to a client, without internal details.
    pub fn public_message(&self) -> String {
        match self {
            AppError::AddressNotFound(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::ExternalApiError(_) => "External service error".to_string(),
            AppError::InternalError(_) => "Internal server error".to_string(),
            AppError::Cancelled => "Request cancelled".to_string(),
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::AddressNotFound(msg) => write!(f, "Address not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Cancelled => write!(f, "Request cancelled"),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::AddressNotFound(msg) => {
                tracing::info!("Address not found: {}", msg);
                StatusCode::NOT_FOUND
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                StatusCode::BAD_GATEWAY
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Cancelled => {
                tracing::debug!("Request cancelled before a response was produced");
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::WithContext { source, context } => {
                // Log the context at the level of the wrapped error
                if source.is_server_error() {
                    tracing::error!("Error with context: {} -> {}", context, source);
                } else if source.is_cancelled() {
                    tracing::debug!("{} -> {}", context, source);
                } else {
                    tracing::info!("{} -> {}", context, source);
                }
                // Delegate to underlying error's response
                return (*source.clone()).into_response();
            }
        };

        let body = Json(json!({
            "error": self.public_message(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Failure of a single upstream adapter.
///
/// Never crosses the orchestrator boundary except as the message stored in
/// `errors[source]` and in the failure progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Transport-level failure (connect, TLS, body read).
    Http(String),
    /// Upstream answered with a non-success status.
    Status { status: u16, body: String },
    /// Upstream answered but the payload could not be decoded.
    Decode(String),
    /// No usable data for this address.
    NoData,
    Timeout,
    /// The adapter's circuit breaker is open.
    CircuitOpen,
    /// A required input (building id, region code, credential) is absent.
    MissingParameter(&'static str),
    /// The adapter itself misbehaved (panic, wrong record type).
    Internal(String),
}

impl AdapterError {
    /// Whether the error says something about the upstream's health.
    ///
    /// 401 and 403 reflect the credential used, not the upstream.
    pub fn counts_against_breaker(&self) -> bool {
        match self {
            AdapterError::Status { status, .. } => !matches!(status, 401 | 403),
            AdapterError::Http(_) | AdapterError::Decode(_) | AdapterError::Timeout => true,
            _ => false,
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Http(msg) => write!(f, "request failed: {}", msg),
            AdapterError::Status { status, body } if body.is_empty() => {
                write!(f, "upstream returned {}", status)
            }
            AdapterError::Status { status, body } => {
                write!(f, "upstream returned {}: {}", status, body)
            }
            AdapterError::Decode(msg) => write!(f, "invalid upstream payload: {}", msg),
            AdapterError::NoData => write!(f, "no data available"),
            AdapterError::Timeout => write!(f, "timed out"),
            AdapterError::CircuitOpen => write!(f, "circuit open"),
            AdapterError::MissingParameter(name) => write!(f, "missing parameter: {}", name),
            AdapterError::Internal(msg) => write!(f, "internal adapter error: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_decode() {
            AdapterError::Decode(err.to_string())
        } else {
            AdapterError::Http(err.without_url().to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_keeps_cancellation() {
        let err: Result<(), AppError> = Err(AppError::Cancelled);
        let wrapped = err.context("aggregating 1234AB 5").unwrap_err();

        assert!(wrapped.is_cancelled());
        assert_eq!(wrapped.to_string(), "aggregating 1234AB 5: Request cancelled");
    }

    #[test]
    fn test_status_codes() {
        let not_found = AppError::AddressNotFound("1234AB 5".to_string()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad = AppError::BadRequest("postcode missing".to_string()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let wrapped = AppError::WithContext {
            source: Box::new(AppError::BadRequest("x".to_string())),
            context: "parsing".to_string(),
        }
        .into_response();
        assert_eq!(wrapped.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_adapter_error_messages() {
        assert_eq!(AdapterError::CircuitOpen.to_string(), "circuit open");
        assert_eq!(
            AdapterError::Status { status: 503, body: String::new() }.to_string(),
            "upstream returned 503"
        );
        assert!(AdapterError::Timeout.counts_against_breaker());
        assert!(!AdapterError::Status { status: 401, body: String::new() }.counts_against_breaker());
        assert!(AdapterError::Status { status: 500, body: String::new() }.counts_against_breaker());
        assert!(!AdapterError::MissingParameter("buildingId").counts_against_breaker());
    }

    #[test]
    fn test_server_errors_through_context() {
        let not_found: Result<(), AppError> =
            Err(AppError::AddressNotFound("No address found for 9999ZZ 1".to_string()));
        let wrapped = not_found.context("aggregating 9999ZZ 1").unwrap_err();
        assert!(!wrapped.is_server_error());
        assert_eq!(wrapped.into_response().status(), StatusCode::NOT_FOUND);

        let internal: Result<(), AppError> = Err(AppError::InternalError("boom".to_string()));
        assert!(internal.context("aggregating").unwrap_err().is_server_error());
    }

    #[test]
    fn test_public_message_hides_internal_details() {
        let err = AppError::InternalError("mutex poisoned at orchestrator.rs".to_string());
        assert_eq!(err.public_message(), "Internal server error");
    }
}
