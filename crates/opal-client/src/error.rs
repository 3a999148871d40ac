//! Error taxonomy for remote API calls.
//!
//! Four kinds of failure exist, and they are deliberately distinct:
//! transport failures (no response at all), protocol failures (a non-2xx
//! status, possibly with structured detail from the server), validation
//! failures (caller input rejected before any network call) and state
//! failures (a precondition such as the lock version could not be
//! obtained). Nothing here performs I/O and nothing is ever retried.

use opal_core::CoreError;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the OpenProject client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was obtained (connection, DNS or timeout failure).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The server answered with an error, or a 2xx body that could not
    /// be decoded as JSON.
    #[error("{message}")]
    Protocol {
        /// HTTP status code of the response.
        status: u16,
        /// Message assembled from the status line and any structured
        /// error detail in the body.
        message: String,
        /// Raw parsed response body, for display by callers.
        body: Value,
        /// Field-level validation errors as `"field: detail"` strings.
        validation_errors: Vec<String>,
    },

    /// Caller-supplied input failed a local precondition.
    #[error("validation error: {0}")]
    Validation(String),

    /// A required precondition object could not be obtained.
    #[error("{0}")]
    State(String),
}

impl ApiError {
    /// Build a protocol error from an HTTP status and a parsed error body.
    ///
    /// The base message is `"API request failed: <status> <reason>"`. If
    /// the body carries a HAL error collection (`_embedded.errors`), the
    /// joined `message` fields replace the base message. If the body
    /// carries a field-keyed validation map (`errors`), the per-field
    /// details are appended. This is pure data transformation and never
    /// fails, whatever shape the body has.
    #[must_use]
    pub fn protocol(status: u16, reason: &str, body: Value) -> Self {
        let mut message = format!("API request failed: {status} {reason}");

        let embedded: Vec<&str> = body
            .get("_embedded")
            .and_then(|e| e.get("errors"))
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if !embedded.is_empty() {
            message = embedded.join("; ");
        }

        let mut validation_errors = Vec::new();
        if let Some(map) = body.get("errors").and_then(Value::as_object) {
            for (field, detail) in map {
                match detail {
                    Value::Array(entries) => {
                        for entry in entries {
                            validation_errors.push(format!("{field}: {}", render(entry)));
                        }
                    }
                    other => validation_errors.push(format!("{field}: {}", render(other))),
                }
            }
        }
        if !validation_errors.is_empty() {
            message = format!("{message}. Validation errors: {}", validation_errors.join("; "));
        }

        Self::Protocol {
            status,
            message,
            body,
            validation_errors,
        }
    }

    /// Build a protocol error for a 2xx response whose body was not JSON.
    #[must_use]
    pub fn invalid_json(status: u16, cause: &str) -> Self {
        Self::Protocol {
            status,
            message: format!("Invalid JSON response: {cause}"),
            body: Value::Null,
            validation_errors: Vec::new(),
        }
    }

    /// HTTP status code, when a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, when one was received and parsed.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Protocol { body, .. } if !body.is_null() => Some(body),
            _ => None,
        }
    }

    /// Field-level validation errors extracted from the response body.
    #[must_use]
    pub fn validation_errors(&self) -> &[String] {
        match self {
            Self::Protocol {
                validation_errors, ..
            } => validation_errors,
            _ => &[],
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Render a detail value as display text: strings verbatim, everything
/// else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_message_without_detail() {
        let err = ApiError::protocol(404, "Not Found", json!({}));
        assert_eq!(err.to_string(), "API request failed: 404 Not Found");
        assert_eq!(err.status(), Some(404));
        assert!(err.validation_errors().is_empty());
    }

    #[test]
    fn test_hal_error_collection_replaces_message() {
        let body = json!({
            "_embedded": { "errors": [{"message": "A"}, {"message": "B"}] }
        });
        let err = ApiError::protocol(422, "Unprocessable Entity", body);
        assert_eq!(err.to_string(), "A; B");
    }

    #[test]
    fn test_validation_map_appended() {
        let body = json!({ "errors": { "subject": ["is blank"] } });
        let err = ApiError::protocol(422, "Unprocessable Entity", body);
        assert!(err
            .to_string()
            .ends_with("Validation errors: subject: is blank"));
        assert_eq!(err.validation_errors(), ["subject: is blank"]);
    }

    #[test]
    fn test_validation_map_multiple_fields_and_details() {
        let body = json!({
            "errors": {
                "dueDate": ["must be after start date", "is in the past"],
                "subject": "is blank"
            }
        });
        let err = ApiError::protocol(422, "Unprocessable Entity", body);
        let details = err.validation_errors();
        assert_eq!(details.len(), 3);
        assert!(details.contains(&"dueDate: must be after start date".to_string()));
        assert!(details.contains(&"dueDate: is in the past".to_string()));
        assert!(details.contains(&"subject: is blank".to_string()));
    }

    #[test]
    fn test_hal_and_validation_combined() {
        let body = json!({
            "_embedded": { "errors": [{"message": "Subject can't be blank."}] },
            "errors": { "subject": ["is blank"] }
        });
        let err = ApiError::protocol(422, "Unprocessable Entity", body);
        assert_eq!(
            err.to_string(),
            "Subject can't be blank.. Validation errors: subject: is blank"
        );
    }

    #[test]
    fn test_body_preserved() {
        let body = json!({ "errorIdentifier": "urn:openproject-org:api:v3:errors:NotFound" });
        let err = ApiError::protocol(404, "Not Found", body.clone());
        assert_eq!(err.body(), Some(&body));
    }

    #[test]
    fn test_transport_message() {
        let err = ApiError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Request failed: connection refused");
        assert!(err.status().is_none());
        assert!(err.body().is_none());
    }

    #[test]
    fn test_core_error_maps_to_validation() {
        let core = CoreError::MissingField { field: "subject" };
        let err = ApiError::from(core);
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
