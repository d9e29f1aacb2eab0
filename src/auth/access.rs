//! Role, ownership and assignment checks for cases and documents.
//!
//! Clients own cases. Lawyers only reach a case through an assignment row.
//! Reads of anything the caller cannot see fail with `NotFound`, so the
//! existence of other workspaces' cases is never confirmed.

use std::sync::Arc;
use uuid::Uuid;

use super::{AuthError, AuthResult, Clock};
use crate::db::{
    AssignmentOutcome, Case, CaseAssignment, CaseDocument, User, UserRole, MAX_NOTES_CHARS,
};
use crate::store::{Store, StoreError};

pub struct AccessControl {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Fail unless `user` is a client workspace. `action` completes
    /// "Only client workspaces can ..."
    pub fn require_client(user: &User, action: &str) -> AuthResult<()> {
        if user.role.can_own_cases() {
            Ok(())
        } else {
            Err(AuthError::forbidden(format!(
                "Only client workspaces can {}",
                action
            )))
        }
    }

    /// Fail unless `user` owns the case. Foreign and missing cases are
    /// reported alike.
    pub async fn ensure_case_owned(&self, case_id: &str, user: &User) -> AuthResult<()> {
        if self.store.count_owned_cases(case_id, &user.id).await? > 0 {
            Ok(())
        } else {
            Err(AuthError::forbidden("You do not own this case"))
        }
    }

    /// Check whether `user` may read the case at all
    pub async fn can_view_case(&self, case_id: &str, user: &User) -> AuthResult<bool> {
        let count = match user.role {
            UserRole::Client => self.store.count_owned_cases(case_id, &user.id).await?,
            UserRole::Lawyer => self.store.count_assignments(case_id, &user.id).await?,
        };
        Ok(count > 0)
    }

    /// Load a case for reading
    pub async fn visible_case(&self, case_id: &str, user: &User) -> AuthResult<Case> {
        if !self.can_view_case(case_id, user).await? {
            return Err(AuthError::not_found("Case not found"));
        }
        self.store
            .find_case(case_id)
            .await?
            .ok_or_else(|| AuthError::not_found("Case not found"))
    }

    /// Own cases for clients, assigned cases for lawyers, newest first
    pub async fn visible_cases(&self, user: &User) -> AuthResult<Vec<Case>> {
        let cases = match user.role {
            UserRole::Client => self.store.list_cases_owned_by(&user.id).await?,
            UserRole::Lawyer => self.store.list_cases_assigned_to(&user.id).await?,
        };
        Ok(cases)
    }

    /// Load a document the caller may download
    pub async fn downloadable_document(
        &self,
        case_id: &str,
        document_id: &str,
        user: &User,
    ) -> AuthResult<CaseDocument> {
        if !self.can_view_case(case_id, user).await? {
            let message = match user.role {
                UserRole::Client => "Case not found",
                UserRole::Lawyer => "Document not found",
            };
            return Err(AuthError::not_found(message));
        }
        self.store
            .find_document(document_id, case_id)
            .await?
            .ok_or_else(|| AuthError::not_found("Document not found"))
    }

    /// Assign a lawyer to a client's case, or update the notes of an
    /// existing assignment. Returns the assignment row, the lawyer and
    /// whether the row was new.
    pub async fn assign_lawyer(
        &self,
        case_id: &str,
        lawyer_id: &str,
        notes: &str,
        requester: &User,
    ) -> AuthResult<(CaseAssignment, User, AssignmentOutcome)> {
        Self::require_client(requester, "assign lawyers")?;
        if notes.chars().count() > MAX_NOTES_CHARS {
            return Err(AuthError::Invalid(format!(
                "Notes are too long (max {} characters)",
                MAX_NOTES_CHARS
            )));
        }
        self.ensure_case_owned(case_id, requester).await?;

        let lawyer = self
            .store
            .find_user_with_role(lawyer_id, UserRole::Lawyer)
            .await?
            .ok_or_else(|| AuthError::not_found("Lawyer not found"))?;

        let now = self.clock.now();
        if let Some(existing) = self.store.find_assignment(case_id, lawyer_id).await? {
            let assignment = self.update_notes(existing, notes).await?;
            return Ok((assignment, lawyer, AssignmentOutcome::Updated));
        }

        let assignment = CaseAssignment {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            lawyer_id: lawyer_id.to_string(),
            notes: notes.to_string(),
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_assignment(&assignment).await {
            Ok(()) => {
                tracing::info!(case_id = %case_id, lawyer_id = %lawyer_id, "Lawyer assigned");
                Ok((assignment, lawyer, AssignmentOutcome::Created))
            }
            Err(StoreError::Conflict(_)) => {
                // Lost a race with a concurrent assign of the same pair
                let existing = self
                    .store
                    .find_assignment(case_id, lawyer_id)
                    .await?
                    .ok_or_else(|| AuthError::Internal("Assignment vanished".to_string()))?;
                let assignment = self.update_notes(existing, notes).await?;
                Ok((assignment, lawyer, AssignmentOutcome::Updated))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_notes(
        &self,
        mut assignment: CaseAssignment,
        notes: &str,
    ) -> AuthResult<CaseAssignment> {
        if assignment.notes != notes {
            let now = self.clock.now();
            self.store
                .update_assignment_notes(&assignment.id, notes, now)
                .await?;
            assignment.notes = notes.to_string();
            assignment.updated_at = now;
        }
        Ok(assignment)
    }
}
