use thiserror::Error;

use crate::store::StoreError;

/// Failures of the session, verification and access-control services
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session, unknown token or bad credentials
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Verification code expired")]
    CodeExpired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AuthError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AuthError::NotFound(message.into())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::Database(e) => AuthError::Internal(e.to_string()),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
