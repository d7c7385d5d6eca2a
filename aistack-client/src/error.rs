//! Error types for the orchestrator client

use aistack_core::dto::job::TriggerBusy;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the orchestrator
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// A job is already in flight
    #[error("Orchestrator is busy: {0}")]
    Busy(String),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    ///
    /// Error bodies of the form `{"error": "..."}` are unwrapped to their
    /// message; a `409` carrying a busy body becomes [`ClientError::Busy`].
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();

        if status == 409 {
            if let Ok(busy) = serde_json::from_str::<TriggerBusy>(&body) {
                return Self::Busy(busy.message);
            }
        }

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error")?.as_str().map(str::to_string))
            .unwrap_or(body);

        Self::ApiError { status, message }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the trigger was refused because a job is running
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_)) || matches!(self, Self::ApiError { status: 409, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Busy(_))
            || matches!(self, Self::ApiError { status, .. } if (400..500).contains(status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_body_is_recognised() {
        let err = ClientError::api_error(
            409,
            r#"{"status":"busy","message":"job 42 is in flight"}"#,
        );
        assert!(err.is_busy());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Orchestrator is busy: job 42 is in flight");
    }

    #[test]
    fn test_error_body_is_unwrapped() {
        let err = ClientError::api_error(404, r#"{"error":"Job not found"}"#);
        assert!(err.is_not_found());
        match err {
            ClientError::ApiError { message, .. } => assert_eq!(message, "Job not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plain_body_is_kept() {
        let err = ClientError::api_error(502, "Bad Gateway");
        assert!(err.is_server_error());
        assert!(!err.is_busy());
        assert_eq!(err.to_string(), "API error (status 502): Bad Gateway");
    }
}
