pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod store;

#[cfg(test)]
mod test_support;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::auth::{AccessControl, Clock, SessionManager, SessionPolicy, VerificationCodeIssuer};
use crate::store::Store;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub sessions: SessionManager,
    pub verification: VerificationCodeIssuer,
    pub access: AccessControl,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionManager::new(
            store.clone(),
            clock.clone(),
            SessionPolicy::from_config(&config.auth),
        );
        let verification = VerificationCodeIssuer::new(
            store.clone(),
            clock.clone(),
            config.auth.verification_code_ttl(),
        );
        let access = AccessControl::new(store.clone(), clock.clone());

        Self {
            config,
            store,
            clock,
            sessions,
            verification,
            access,
        }
    }
}
