//! Session issuance, validation and expiry.
//!
//! A session stays alive while two limits both hold: the idle limit
//! (`inactivity_window` since the last request) and the hard ceiling
//! (`absolute_ttl` since creation). Every successful authentication slides
//! `expires_at` forward, clamped to the ceiling. Expired sessions are deleted
//! lazily when presented, and swept in bulk whenever a new session is created.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthError, AuthResult, Clock};
use crate::config::AuthConfig;
use crate::db::{ActiveSession, Session, User};
use crate::store::Store;

const MAX_USER_AGENT_CHARS: usize = 255;
const MAX_IP_CHARS: usize = 64;

/// Dual TTL policy applied to every session
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub inactivity_window: Duration,
    pub absolute_ttl: Duration,
}

impl SessionPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            inactivity_window: config.inactivity_window(),
            absolute_ttl: config.absolute_ttl(),
        }
    }

    /// Expiry of a session created at `now`
    pub fn initial_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        later_by(now, self.inactivity_window).min(later_by(now, self.absolute_ttl))
    }

    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now > session.expires_at
            || now - session.last_activity > self.inactivity_window
            || now - session.created_at > self.absolute_ttl
    }

    /// Expiry after a touch at `now`, never past the absolute ceiling
    pub fn refreshed_expiry(&self, session: &Session, now: DateTime<Utc>) -> DateTime<Utc> {
        later_by(now, self.inactivity_window)
            .min(later_by(session.created_at, self.absolute_ttl))
    }
}

/// `at + by`, pinned to the latest representable instant on overflow
pub(super) fn later_by(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct SessionManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Open a new session for `user`
    pub async fn create_session(
        &self,
        user: &User,
        user_agent: &str,
        ip: &str,
    ) -> AuthResult<ActiveSession> {
        let now = self.clock.now();

        let swept = self.store.delete_expired_sessions(now).await?;
        if swept > 0 {
            tracing::debug!(count = swept, "Removed expired sessions");
        }

        let token = generate_token();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token_hash: hash_token(&token),
            user_agent: truncate_chars(user_agent, MAX_USER_AGENT_CHARS),
            ip: truncate_chars(ip, MAX_IP_CHARS),
            last_activity: now,
            expires_at: self.policy.initial_expiry(now),
            created_at: now,
        };
        self.store.insert_session(&session).await?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "Session created");
        Ok(ActiveSession { session, token })
    }

    /// Resolve a presented token, sliding the session forward on success
    pub async fn authenticate(&self, token: &str) -> AuthResult<(ActiveSession, User)> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let (mut session, user) = self
            .store
            .find_session_with_user(&hash_token(token))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let now = self.clock.now();
        if self.policy.is_expired(&session, now) {
            self.store.delete_session(&session.id).await?;
            tracing::debug!(session_id = %session.id, "Session expired");
            return Err(AuthError::SessionExpired);
        }

        let expires_at = self.policy.refreshed_expiry(&session, now);
        if !self.store.touch_session(&session.id, now, expires_at).await? {
            // Deleted by a concurrent logout
            return Err(AuthError::Unauthenticated);
        }
        session.last_activity = session.last_activity.max(now);
        session.expires_at = session.expires_at.max(expires_at);

        Ok((
            ActiveSession {
                session,
                token: token.to_string(),
            },
            user,
        ))
    }

    /// Delete the session behind `token`, if any
    pub async fn destroy(&self, token: &str) -> AuthResult<()> {
        if token.is_empty() {
            return Ok(());
        }
        let removed = self
            .store
            .delete_session_by_token_hash(&hash_token(token))
            .await?;
        if removed > 0 {
            tracing::info!("Session destroyed");
        }
        Ok(())
    }
}

/// 32 random bytes, URL-safe base64 without padding
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest stored in place of the token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
