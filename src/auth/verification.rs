use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use super::session::later_by;
use super::{AuthError, AuthResult, Clock};
use crate::db::{User, VerificationToken};
use crate::store::Store;

/// Issues and redeems the six-digit codes that confirm an email address
pub struct VerificationCodeIssuer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl VerificationCodeIssuer {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// How long a freshly issued code stays valid, in whole minutes
    pub fn ttl_minutes(&self) -> i64 {
        self.ttl.num_minutes()
    }

    /// Replace every outstanding code of the user with a new one
    pub async fn issue_code(&self, user_id: &str) -> AuthResult<String> {
        let code = generate_code();
        let now = self.clock.now();

        self.store
            .replace_verification_token(&VerificationToken {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                code: code.clone(),
                expires_at: later_by(now, self.ttl),
                created_at: now,
            })
            .await?;

        tracing::debug!(user_id = %user_id, "Issued verification code");
        Ok(code)
    }

    /// Redeem `code` for `user`, returning the account marked verified
    pub async fn redeem(&self, user: &User, code: &str) -> AuthResult<User> {
        let token = self
            .store
            .find_verification_token(&user.id, code)
            .await?
            .ok_or_else(|| AuthError::not_found("Invalid verification code"))?;

        let now = self.clock.now();
        if token.is_expired_at(now) {
            self.store.delete_verification_token(&token.id).await?;
            return Err(AuthError::CodeExpired);
        }

        let mut user = user.clone();
        if !user.verified {
            self.store.mark_user_verified(&user.id, now).await?;
            user.verified = true;
            user.updated_at = now;
        }

        self.store.delete_verification_tokens(&user.id).await?;
        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user)
    }
}

fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}
