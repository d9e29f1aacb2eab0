use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use lazy_static::lazy_static;

use super::AuthError;

lazy_static! {
    /// Hash checked when no account matches, so unknown emails cost a full
    /// Argon2 verification like known ones
    static ref UNKNOWN_ACCOUNT_HASH: Option<String> =
        hash_password("lexiflow-unknown-account").ok();
}

/// Hash a password with Argon2id and a fresh salt, as a PHC string
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Run a verification that always fails, for logins naming no account
pub fn verify_unknown_account(password: &str) -> bool {
    if let Some(hash) = UNKNOWN_ACCOUNT_HASH.as_deref() {
        verify_password(hash, password);
    }
    false
}
