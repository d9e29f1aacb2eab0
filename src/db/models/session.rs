//! Login sessions.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A persisted session. Only a digest of the bearer token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub user_agent: String,
    pub ip: String,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A session together with the plaintext bearer token presented by (or
/// issued to) the client.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session: Session,
    pub token: String,
}
