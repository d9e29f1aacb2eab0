//! Cases, their documents and lawyer assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Case owned by a client workspace
#[derive(Debug, Clone, FromRow)]
pub struct Case {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub priority: String,
    pub status: String,
    pub matter_type: String,
    pub owner: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub user_id: String,
    pub name: String,
    pub priority: String,
    pub status: String,
    pub matter_type: String,
    pub owner: String,
    pub summary: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct CaseDocument {
    pub id: String,
    pub case_id: String,
    pub title: String,
    pub owner: String,
    pub description: String,
    pub status: String,
    pub category: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub case_id: String,
    pub title: String,
    pub owner: String,
    pub description: String,
    pub status: String,
    pub category: String,
    pub storage_path: String,
}

/// Maximum length of assignment notes, in characters
pub const MAX_NOTES_CHARS: usize = 512;

/// Link granting a lawyer access to one case
#[derive(Debug, Clone, FromRow)]
pub struct CaseAssignment {
    pub id: String,
    pub case_id: String,
    pub lawyer_id: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Assignment joined with the assigned lawyer's account details
#[derive(Debug, Clone, FromRow)]
pub struct AssignmentWithLawyer {
    pub case_id: String,
    pub lawyer_id: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub lawyer_company_name: String,
    pub lawyer_email: String,
}

/// Whether an assign call inserted a new row or edited an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Created,
    Updated,
}

impl AssignmentOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, AssignmentOutcome::Created)
    }
}

// -------------------------------------------------------------------------
// Request payloads
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub storage_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    pub name: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub matter_type: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub documents: Vec<DocumentPayload>,
    #[serde(default)]
    pub personal_documents: Vec<DocumentPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignLawyerRequest {
    pub lawyer_id: String,
    #[serde(default)]
    pub notes: String,
}

// -------------------------------------------------------------------------
// Responses
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub case_id: String,
    pub name: String,
    pub owner: String,
    pub description: String,
    pub status: String,
    pub category: String,
    pub storage_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CaseDocument> for DocumentResponse {
    fn from(doc: &CaseDocument) -> Self {
        let download_url = if doc.storage_path.is_empty() {
            None
        } else {
            Some(format!(
                "/api/v1/cases/{}/documents/{}/download",
                doc.case_id, doc.id
            ))
        };

        Self {
            id: doc.id.clone(),
            case_id: doc.case_id.clone(),
            name: doc.title.clone(),
            owner: doc.owner.clone(),
            description: doc.description.clone(),
            status: doc.status.clone(),
            category: doc.category.clone(),
            storage_path: doc.storage_path.clone(),
            download_url,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLawyerResponse {
    pub id: String,
    pub company_name: String,
    pub email: String,
    pub assigned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl From<&AssignmentWithLawyer> for CaseLawyerResponse {
    fn from(a: &AssignmentWithLawyer) -> Self {
        Self {
            id: a.lawyer_id.clone(),
            company_name: a.lawyer_company_name.clone(),
            email: a.lawyer_email.clone(),
            assigned_at: a.created_at,
            notes: a.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseClientResponse {
    pub id: String,
    pub company_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResponse {
    pub id: String,
    pub name: String,
    pub priority: String,
    pub status: String,
    pub matter_type: String,
    pub owner: String,
    pub summary: String,
    pub documents: Vec<DocumentResponse>,
    pub assigned_lawyers: Vec<CaseLawyerResponse>,
    /// Only filled in for lawyers, who need to know whose case it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<CaseClientResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseResponse {
    pub fn new(
        case: &Case,
        documents: &[CaseDocument],
        assignments: &[AssignmentWithLawyer],
    ) -> Self {
        Self {
            id: case.id.clone(),
            name: case.name.clone(),
            priority: case.priority.clone(),
            status: case.status.clone(),
            matter_type: case.matter_type.clone(),
            owner: case.owner.clone(),
            summary: case.summary.clone(),
            documents: documents.iter().map(DocumentResponse::from).collect(),
            assigned_lawyers: assignments.iter().map(CaseLawyerResponse::from).collect(),
            client: None,
            created_at: case.created_at,
            updated_at: case.updated_at,
        }
    }

    pub fn with_client(mut self, client: CaseClientResponse) -> Self {
        self.client = Some(client);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct CaseListResponse {
    pub cases: Vec<CaseResponse>,
}

#[derive(Debug, Serialize)]
pub struct CaseEnvelope {
    pub case: CaseResponse,
}

#[derive(Debug, Serialize)]
pub struct DocumentEnvelope {
    pub document: DocumentResponse,
}

#[derive(Debug, Serialize)]
pub struct AssignmentEnvelope {
    pub assignment: CaseLawyerResponse,
}
