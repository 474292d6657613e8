//! Client error types.

use track_core::sync::{FieldErrors, SyncError};

use thiserror::Error;

/// Result type alias for client module.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server returned {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Request(e) => SyncError::Network(e.to_string()),
            ClientError::Unauthorized => SyncError::Unauthenticated,
            ClientError::Validation(fields) => SyncError::Validation(fields),
            ClientError::NotFound { resource } => SyncError::NotFound(resource),
            ClientError::Conflict(message) => SyncError::Conflict(message),
            ClientError::ServerError { status, message } => SyncError::Server { status, message },
            ClientError::Json(e) => SyncError::Network(e.to_string()),
        }
    }
}

/// Parses a non-success response body into a [`ClientError`].
///
/// Validation failures arrive as a JSON object mapping field names to
/// arrays of messages; anything else is carried through as a server
/// error with the raw body as its message.
pub(crate) fn error_from_body(status: u16, resource: &str, body: &str) -> ClientError {
    match status {
        400 | 422 => match parse_field_errors(body) {
            Some(fields) => ClientError::Validation(fields),
            None => ClientError::ServerError {
                status,
                message: body.to_string(),
            },
        },
        401 => ClientError::Unauthorized,
        404 => ClientError::NotFound {
            resource: resource.to_string(),
        },
        409 => ClientError::Conflict(detail_message(body)),
        _ => ClientError::ServerError {
            status,
            message: detail_message(body),
        },
    }
}

fn parse_field_errors(body: &str) -> Option<FieldErrors> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    let mut fields = FieldErrors::new();
    for (name, messages) in object {
        let messages: Vec<String> = match messages {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            serde_json::Value::String(message) => vec![message.clone()],
            _ => return None,
        };
        if messages.is_empty() {
            return None;
        }
        fields.insert(name.clone(), messages);
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Extracts the "detail" message DRF-style error bodies carry, falling
/// back to the raw body.
fn detail_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_body_maps_to_field_errors() {
        let body = r#"{"title": ["This field may not be blank."], "end_date": ["Invalid date."]}"#;
        let err = error_from_body(400, "task", body);
        match err {
            ClientError::Validation(fields) => {
                assert_eq!(fields["title"], vec!["This field may not be blank."]);
                assert_eq!(fields["end_date"], vec!["Invalid date."]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_422_body_maps_to_field_errors() {
        let body = r#"{"title": ["This field may not be blank."]}"#;
        let err = error_from_body(422, "task", body);
        match err {
            ClientError::Validation(fields) => {
                assert_eq!(fields["title"], vec!["This field may not be blank."]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unstructured_400_is_a_server_error() {
        let err = error_from_body(400, "task", "<html>bad request</html>");
        assert!(matches!(err, ClientError::ServerError { status: 400, .. }));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_from_body(401, "task", ""),
            ClientError::Unauthorized
        ));
        assert!(matches!(
            error_from_body(404, "task", ""),
            ClientError::NotFound { .. }
        ));
        assert!(matches!(
            error_from_body(409, "task", r#"{"detail": "stale"}"#),
            ClientError::Conflict(message) if message == "stale"
        ));
        assert!(matches!(
            error_from_body(500, "task", "boom"),
            ClientError::ServerError { status: 500, .. }
        ));
    }

    #[test]
    fn test_sync_error_conversion() {
        let err: SyncError = ClientError::Unauthorized.into();
        assert_eq!(err, SyncError::Unauthenticated);

        let err: SyncError = ClientError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(
            err,
            SyncError::Server {
                status: 503,
                message: "unavailable".to_string()
            }
        );
    }
}
