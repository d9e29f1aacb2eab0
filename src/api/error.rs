//! Unified API error handling.
//!
//! Every failure leaves the API as the same JSON envelope:
//! `{"error": {"code": "...", "message": "...", "details": {...}}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,

    // Server errors (5xx)
    InternalError,
}

impl ErrorCode {
    /// HTTP status every error of this code is sent with
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire name used in the `code` field
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// The `error` object of the envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Message safe to show the caller
    pub message: String,
    /// Field errors, or extra values such as a reissued verification code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Field-level validation errors
    ValidationErrors(HashMap<String, Vec<String>>),
    /// Generic key-value details
    Generic(HashMap<String, serde_json::Value>),
}

/// The full error response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    /// Always the default status of `code`
    status: StatusCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// Create an error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a single generic detail, merging with any already present
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let mut map = match self.details.take() {
            Some(ErrorDetails::Generic(map)) => map,
            _ => HashMap::new(),
        };
        map.insert(key.to_string(), value.into());
        self.details = Some(ErrorDetails::Generic(map));
        self
    }

    // Convenience constructors

    /// Malformed request (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Authentication required or failed (401)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Authenticated but not allowed (403)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Missing, or hidden from the caller (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Resource already exists (409)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        let mut err = Self::new(ErrorCode::ValidationError, message);
        err.details = Some(ErrorDetails::ValidationErrors(errors));
        err
    }

    /// Validation error for a single field
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Internal server error (500). Never pass the underlying cause here.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::unauthorized("Authentication required"),
            AuthError::SessionExpired => ApiError::unauthorized("Session expired"),
            AuthError::CodeExpired => ApiError::unauthorized("Verification code expired"),
            AuthError::Forbidden(msg) => ApiError::forbidden(msg),
            AuthError::NotFound(msg) => ApiError::not_found(msg),
            AuthError::Conflict(msg) => ApiError::conflict(msg),
            AuthError::Invalid(msg) => ApiError::bad_request(msg),
            AuthError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => {
                tracing::warn!("Constraint violation: {}", msg);
                ApiError::conflict("A resource with this identifier already exists")
            }
            StoreError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::internal("A database error occurred")
            }
        }
    }
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a field check, if it failed
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_statuses() {
        let cases = [
            (AuthError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AuthError::SessionExpired, StatusCode::UNAUTHORIZED),
            (AuthError::CodeExpired, StatusCode::UNAUTHORIZED),
            (AuthError::forbidden("no"), StatusCode::FORBIDDEN),
            (AuthError::not_found("gone"), StatusCode::NOT_FOUND),
            (AuthError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AuthError::Invalid("bad".into()), StatusCode::BAD_REQUEST),
            (AuthError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_internal_cause_is_not_echoed() {
        let err = ApiError::from(AuthError::Internal("disk on fire at /var/db".into()));
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("disk"));
    }

    #[test]
    fn test_validation_error_single_field() {
        let err = ApiError::validation_field("email", "Invalid email format");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "Invalid email format");
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "Name is required");
        builder.add("email", "Invalid email format");
        builder.check("name", Err("Name is too short".to_string()));
        builder.check("password", Ok(()));

        let err = builder.build().unwrap();
        assert!(err.message.contains("2 fields"));
        match &err.details {
            Some(ErrorDetails::ValidationErrors(errors)) => {
                assert_eq!(errors["name"].len(), 2);
                assert!(!errors.contains_key("password"));
            }
            other => panic!("Expected ValidationErrors details, got {:?}", other),
        }
    }

    #[test]
    fn test_details_serialize_inside_envelope() {
        let err = ApiError::forbidden("Email not verified")
            .with_detail("verificationCode", "012345")
            .with_detail("verificationValid", 15);
        let body = ErrorResponse {
            error: ErrorBody {
                code: err.code.as_str().to_string(),
                message: err.message,
                details: err.details,
            },
        };

        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["error"]["code"], "forbidden");
        assert_eq!(json["error"]["details"]["verificationCode"], "012345");
        assert_eq!(json["error"]["details"]["verificationValid"], 15);
    }
}
