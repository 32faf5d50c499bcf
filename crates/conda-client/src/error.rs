//! Error types.
//!
//! [`RequestError`] describes what went wrong on the wire. The managers log
//! it and hand callers an [`OperationError`] that only says which action
//! failed on which target.

use reqwest::StatusCode;

/// Error type for a single request (including its 202 poll chain).
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server responded with {status}: {}", server_message(.payload))]
    Response {
        status: StatusCode,
        payload: serde_json::Value,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Gave up polling {location} after {attempts} attempts")]
    PollLimit { attempts: u32, location: String },

    #[error("Request cancelled")]
    Cancelled,
}

impl RequestError {
    /// The server-supplied message for a failed response, if any.
    pub fn server_message(&self) -> Option<String> {
        match self {
            RequestError::Response { payload, .. } => Some(server_message(payload)),
            _ => None,
        }
    }
}

/// Pull the human-readable message out of an error payload.
///
/// The service sends `{"error": "..."}`; `message` is accepted too, and a
/// body that was not JSON is stored as a plain string.
fn server_message(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("message"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| payload.to_string()),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Coarse error returned by [`EnvironmentManager`](crate::EnvironmentManager)
/// and [`PackageManager`](crate::PackageManager) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_message_prefers_error_field() {
        let err = RequestError::Response {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            payload: json!({"error": "PackagesNotFoundError", "message": "ignored"}),
        };
        assert_eq!(err.server_message().as_deref(), Some("PackagesNotFoundError"));
        assert!(err.to_string().contains("PackagesNotFoundError"));
    }

    #[test]
    fn test_server_message_falls_back_to_message() {
        let payload = json!({"message": "environment exists"});
        assert_eq!(server_message(&payload), "environment exists");
    }

    #[test]
    fn test_server_message_plain_text_body() {
        let payload = serde_json::Value::String("Bad Gateway".into());
        assert_eq!(server_message(&payload), "Bad Gateway");
    }

    #[test]
    fn test_non_response_errors_have_no_server_message() {
        assert!(RequestError::Cancelled.server_message().is_none());
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new("An error occurred while removing \"base\".");
        assert_eq!(err.to_string(), "An error occurred while removing \"base\".");
    }
}
