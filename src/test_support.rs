//! Shared fixtures for unit tests.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use crate::auth::{hash_password, ManualClock};
use crate::db::{self, NewUser, User, UserRole};
use crate::store::{SqliteStore, Store};

pub const PASSWORD: &str = "correct-horse-battery";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new(db::init_in_memory().await.unwrap()))
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(t0()))
}

/// Insert an unverified account with [`PASSWORD`]
pub async fn user(store: &dyn Store, email: &str, role: UserRole) -> User {
    store
        .create_user(
            NewUser {
                company_name: format!("{} workspace", role),
                email: email.to_string(),
                password_hash: hash_password(PASSWORD).unwrap(),
                subscription: "starter".to_string(),
                role,
            },
            t0(),
        )
        .await
        .unwrap()
}
