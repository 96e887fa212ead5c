use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::keys::KeyError;
use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(#[from] SchemaError),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("the key could not be added: {0}")]
    AddKeyFailed(#[source] KeyError),
}

/// Structured error document returned to callers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub details: ErrorDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorBody>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub http_status_code: u16,
    pub public: bool,
}

impl ErrorBody {
    fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type,
            details: ErrorDetails {
                http_status_code: status.as_u16(),
                public: true,
            },
            cause: None,
        }
    }
}

fn key_error_body(err: &KeyError) -> ErrorBody {
    match err {
        KeyError::DuplicateKey => ErrorBody::new(
            StatusCode::CONFLICT,
            "DuplicateKey",
            "The key is a duplicate and could not be added.",
        ),
        KeyError::InvalidKeyPair(inner) => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "InvalidKeyPair", inner.to_string())
        }
        KeyError::PermissionDenied(inner) => {
            ErrorBody::new(StatusCode::FORBIDDEN, "PermissionDenied", inner.to_string())
        }
        KeyError::KeyIdMismatch { .. } => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "URLMismatchError", "Incorrect key id.")
        }
        KeyError::NotFound => {
            ErrorBody::new(StatusCode::NOT_FOUND, "NotFound", "Key not found.")
        }
        KeyError::Store(_) => ErrorBody::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalServerError",
            "The key store could not complete the request.",
        ),
    }
}

impl AppError {
    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Validation(err) => {
                ErrorBody::new(StatusCode::BAD_REQUEST, "ValidationError", err.to_string())
            }
            AppError::MalformedRequest(message) => {
                ErrorBody::new(StatusCode::BAD_REQUEST, "ValidationError", message.clone())
            }
            AppError::NotAuthenticated => ErrorBody::new(
                StatusCode::BAD_REQUEST,
                "PermissionDenied",
                "Authentication required.",
            ),
            AppError::Key(err) => key_error_body(err),
            AppError::AddKeyFailed(err) => {
                let mut body = ErrorBody::new(
                    StatusCode::BAD_REQUEST,
                    "AddKeyFailed",
                    "The key could not be added.",
                );
                body.cause = Some(Box::new(key_error_body(err)));
                body
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.body();
        let status = StatusCode::from_u16(body.details.http_status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(?self);
        } else {
            tracing::warn!(error = %self, error_type = body.error_type, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{AuthorizationError, KeyPairError, KeyPermission};

    #[test]
    fn add_failures_wrap_their_cause() {
        let err = AppError::AddKeyFailed(KeyError::InvalidKeyPair(KeyPairError::Mismatch));
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["type"], "AddKeyFailed");
        assert_eq!(body["details"]["httpStatusCode"], 400);
        assert_eq!(body["cause"]["type"], "InvalidKeyPair");
    }

    #[test]
    fn permission_status_depends_on_authentication() {
        let unauthenticated = AppError::NotAuthenticated.body();
        assert_eq!(unauthenticated.error_type, "PermissionDenied");
        assert_eq!(unauthenticated.details.http_status_code, 400);

        let denied = AppError::Key(KeyError::PermissionDenied(AuthorizationError {
            actor: "u2".into(),
            permission: KeyPermission::Edit,
            owner: "u1".into(),
        }))
        .body();
        assert_eq!(denied.error_type, "PermissionDenied");
        assert_eq!(denied.details.http_status_code, 403);
    }

    #[test]
    fn id_mismatch_uses_url_mismatch_type() {
        let body = AppError::Key(KeyError::KeyIdMismatch {
            url_id: "a".into(),
            body_id: "b".into(),
        })
        .body();
        assert_eq!(body.error_type, "URLMismatchError");
        assert_eq!(body.message, "Incorrect key id.");
        assert!(body.cause.is_none());
    }
}
