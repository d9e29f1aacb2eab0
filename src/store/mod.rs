//! Persistence interface consumed by the session and access-control services.
//!
//! Everything that touches the database goes through [`Store`], so the
//! services can be shared across request handlers without holding any state
//! of their own. [`SqliteStore`] is the production implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{
    AssignmentWithLawyer, Case, CaseAssignment, CaseDocument, NewCase, NewDocument, NewUser,
    Session, User, UserRole, VerificationToken,
};

/// Errors raised by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Users

    /// Insert an account. Fails with [`StoreError::Conflict`] if the email is taken.
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User>;

    /// Case-insensitive lookup by email
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// Lookup that only matches an account holding `role`
    async fn find_user_with_role(&self, id: &str, role: UserRole) -> StoreResult<Option<User>>;

    async fn mark_user_verified(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()>;

    async fn update_subscription(
        &self,
        id: &str,
        plan: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    // Verification tokens

    /// Remove every token of a user, returning how many were removed
    async fn delete_verification_tokens(&self, user_id: &str) -> StoreResult<u64>;

    /// Store `token` as the only code of its user, replacing any earlier one
    /// in a single statement
    async fn replace_verification_token(&self, token: &VerificationToken) -> StoreResult<()>;

    /// Exact (user, code) match
    async fn find_verification_token(
        &self,
        user_id: &str,
        code: &str,
    ) -> StoreResult<Option<VerificationToken>>;

    async fn delete_verification_token(&self, id: &str) -> StoreResult<()>;

    // Sessions

    /// Delete every session whose `expires_at` lies before `now`
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Resolve a token digest to its session and owning user
    async fn find_session_with_user(&self, token_hash: &str)
        -> StoreResult<Option<(Session, User)>>;

    /// Slide a session forward. Concurrent touches keep the later of the
    /// competing values. Returns `false` if the session no longer exists.
    async fn touch_session(
        &self,
        id: &str,
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn delete_session(&self, id: &str) -> StoreResult<()>;

    async fn delete_session_by_token_hash(&self, token_hash: &str) -> StoreResult<u64>;

    // Cases

    /// Insert a case together with its initial documents, atomically
    async fn create_case(
        &self,
        case: NewCase,
        documents: Vec<NewDocument>,
        now: DateTime<Utc>,
    ) -> StoreResult<(Case, Vec<CaseDocument>)>;

    async fn find_case(&self, id: &str) -> StoreResult<Option<Case>>;

    /// Delete a case only if `owner_id` owns it
    async fn delete_case(&self, id: &str, owner_id: &str) -> StoreResult<u64>;

    async fn list_cases_owned_by(&self, user_id: &str) -> StoreResult<Vec<Case>>;

    async fn list_cases_assigned_to(&self, lawyer_id: &str) -> StoreResult<Vec<Case>>;

    async fn count_owned_cases(&self, case_id: &str, user_id: &str) -> StoreResult<i64>;

    async fn count_assignments(&self, case_id: &str, lawyer_id: &str) -> StoreResult<i64>;

    // Assignments

    async fn find_assignment(
        &self,
        case_id: &str,
        lawyer_id: &str,
    ) -> StoreResult<Option<CaseAssignment>>;

    /// Fails with [`StoreError::Conflict`] if the (case, lawyer) pair exists
    async fn insert_assignment(&self, assignment: &CaseAssignment) -> StoreResult<()>;

    async fn update_assignment_notes(
        &self,
        id: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn list_assignments(&self, case_id: &str) -> StoreResult<Vec<AssignmentWithLawyer>>;

    // Documents

    async fn insert_document(
        &self,
        document: NewDocument,
        now: DateTime<Utc>,
    ) -> StoreResult<CaseDocument>;

    async fn find_document(&self, id: &str, case_id: &str) -> StoreResult<Option<CaseDocument>>;

    async fn delete_document(&self, id: &str) -> StoreResult<u64>;

    async fn list_documents(&self, case_id: &str) -> StoreResult<Vec<CaseDocument>>;
}
