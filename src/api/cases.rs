use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::path::{Component, PathBuf};
use std::sync::Arc;

use super::auth::CurrentSession;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_name, validate_notes, validate_uuid};
use crate::auth::AccessControl;
use crate::db::{
    AssignLawyerRequest, AssignmentEnvelope, Case, CaseClientResponse, CaseEnvelope,
    CaseLawyerResponse, CaseListResponse, CaseResponse, CreateCaseRequest, DocumentEnvelope,
    DocumentPayload, DocumentResponse, NewCase, NewDocument, User, UserRole,
};
use crate::AppState;

fn default_string(value: &str, fallback: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn new_document(payload: &DocumentPayload, case_id: &str, default_category: &str) -> NewDocument {
    NewDocument {
        case_id: case_id.to_string(),
        title: payload.name.trim().to_string(),
        owner: payload.owner.trim().to_string(),
        description: payload.description.trim().to_string(),
        status: payload.status.trim().to_string(),
        category: default_string(&payload.category, default_category).to_lowercase(),
        storage_path: payload.storage_path.trim().to_string(),
    }
}

fn parse_id(id: &str, field: &str) -> Result<String, ApiError> {
    validate_uuid(id, field).map_err(|e| ApiError::validation_field(field, e))?;
    Ok(id.to_string())
}

/// Assemble the full view of a case: documents, assigned lawyers and, for
/// lawyers, the owning client.
async fn case_response(state: &AppState, case: &Case, viewer: &User) -> Result<CaseResponse, ApiError> {
    let documents = state.store.list_documents(&case.id).await?;
    let assignments = state.store.list_assignments(&case.id).await?;
    let response = CaseResponse::new(case, &documents, &assignments);

    if viewer.role != UserRole::Lawyer {
        return Ok(response);
    }
    match state.store.find_user(&case.user_id).await? {
        Some(client) => Ok(response.with_client(CaseClientResponse {
            id: client.id,
            company_name: client.company_name,
            email: client.email,
        })),
        None => Ok(response),
    }
}

/// List cases visible to the caller
pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Json<CaseListResponse>, ApiError> {
    let cases = state.access.visible_cases(&current.user).await?;

    let mut payload = Vec::with_capacity(cases.len());
    for case in &cases {
        payload.push(case_response(&state, case, &current.user).await?);
    }

    Ok(Json(CaseListResponse { cases: payload }))
}

/// Create a case with its initial documents
pub async fn create_case(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Json(request): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<CaseEnvelope>), ApiError> {
    let user = &current.user;
    AccessControl::require_client(user, "create cases")?;

    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&request.name, "Case name"));
    for (i, doc) in request.documents.iter().enumerate() {
        errors.check(&format!("documents[{}].name", i), validate_name(&doc.name, "Document name"));
    }
    for (i, doc) in request.personal_documents.iter().enumerate() {
        errors.check(
            &format!("personalDocuments[{}].name", i),
            validate_name(&doc.name, "Document name"),
        );
    }
    errors.finish()?;

    let documents = request
        .documents
        .iter()
        .map(|doc| new_document(doc, "", "case"))
        .chain(
            request
                .personal_documents
                .iter()
                .map(|doc| new_document(doc, "", "personal")),
        )
        .collect();

    let (case, documents) = state
        .store
        .create_case(
            NewCase {
                user_id: user.id.clone(),
                name: request.name.trim().to_string(),
                priority: default_string(&request.priority, "Medium"),
                status: default_string(&request.status, "Draft"),
                matter_type: request.matter_type.trim().to_string(),
                owner: request.owner.trim().to_string(),
                summary: request.summary.trim().to_string(),
            },
            documents,
            state.clock.now(),
        )
        .await?;

    tracing::info!(case_id = %case.id, user_id = %user.id, "Case created");

    Ok((
        StatusCode::CREATED,
        Json(CaseEnvelope {
            case: CaseResponse::new(&case, &documents, &[]),
        }),
    ))
}

pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<Json<CaseEnvelope>, ApiError> {
    let case_id = parse_id(&id, "case id")?;
    let case = state.access.visible_case(&case_id, &current.user).await?;

    Ok(Json(CaseEnvelope {
        case: case_response(&state, &case, &current.user).await?,
    }))
}

pub async fn delete_case(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = &current.user;
    AccessControl::require_client(user, "delete cases")?;
    let case_id = parse_id(&id, "case id")?;
    state.access.ensure_case_owned(&case_id, user).await?;

    state.store.delete_case(&case_id, &user.id).await?;
    tracing::info!(case_id = %case_id, user_id = %user.id, "Case deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Assign a lawyer to a case. 201 for a new assignment, 200 when only the
/// notes of an existing one changed.
pub async fn assign_lawyer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
    Json(request): Json<AssignLawyerRequest>,
) -> Result<(StatusCode, Json<AssignmentEnvelope>), ApiError> {
    let case_id = parse_id(&id, "case id")?;
    let lawyer_id = request.lawyer_id.trim();
    let notes = request.notes.trim();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("lawyerId", validate_uuid(lawyer_id, "lawyer id"));
    errors.check("notes", validate_notes(notes));
    errors.finish()?;

    let (assignment, lawyer, outcome) = state
        .access
        .assign_lawyer(&case_id, lawyer_id, notes, &current.user)
        .await?;

    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(AssignmentEnvelope {
            assignment: CaseLawyerResponse {
                id: lawyer.id,
                company_name: lawyer.company_name,
                email: lawyer.email,
                assigned_at: assignment.created_at,
                notes: assignment.notes,
            },
        }),
    ))
}

/// Attach a document record to an owned case
pub async fn attach_document(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
    Json(request): Json<DocumentPayload>,
) -> Result<(StatusCode, Json<DocumentEnvelope>), ApiError> {
    let user = &current.user;
    AccessControl::require_client(user, "attach documents")?;
    let case_id = parse_id(&id, "case id")?;
    state.access.ensure_case_owned(&case_id, user).await?;

    validate_name(&request.name, "Document name")
        .map_err(|e| ApiError::validation_field("name", e))?;

    let document = state
        .store
        .insert_document(new_document(&request, &case_id, "case"), state.clock.now())
        .await?;
    tracing::info!(case_id = %case_id, document_id = %document.id, "Document attached");

    Ok((
        StatusCode::CREATED,
        Json(DocumentEnvelope {
            document: DocumentResponse::from(&document),
        }),
    ))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path((id, document_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let user = &current.user;
    AccessControl::require_client(user, "delete documents")?;
    let case_id = parse_id(&id, "case id")?;
    let document_id = parse_id(&document_id, "document id")?;
    state.access.ensure_case_owned(&case_id, user).await?;

    let document = state
        .store
        .find_document(&document_id, &case_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;
    state.store.delete_document(&document.id).await?;
    tracing::info!(case_id = %case_id, document_id = %document.id, "Document deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Stream a stored document back as an attachment
pub async fn download_document(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path((id, document_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let case_id = parse_id(&id, "case id")?;
    let document_id = parse_id(&document_id, "document id")?;
    let document = state
        .access
        .downloadable_document(&case_id, &document_id, &current.user)
        .await?;

    if document.storage_path.is_empty() {
        return Err(ApiError::not_found("Document not available for download"));
    }

    let root = state.config.documents_dir();
    let path = resolve_storage_path(&root, &document.storage_path)
        .ok_or_else(|| ApiError::not_found("Document missing from storage"))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Document missing from storage"));
        }
        Err(e) => {
            tracing::error!(document_id = %document.id, "Failed to read document: {}", e);
            return Err(ApiError::internal("Unable to read document"));
        }
    };

    let fallback = format!("document-{}", state.clock.now().timestamp());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&document.title, &fallback)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Resolve a stored path below `root`. Absolute paths and parent components
/// are refused.
fn resolve_storage_path(root: &std::path::Path, storage_path: &str) -> Option<PathBuf> {
    let relative = std::path::Path::new(storage_path);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return None;
    }
    Some(root.join(relative))
}

/// Reduce a title to a header-safe file name
fn sanitize_filename(name: &str, fallback: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => Some(c),
            ' ' => Some('_'),
            _ => None,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        cleaned
    }
}
