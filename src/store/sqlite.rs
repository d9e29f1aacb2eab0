use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Store, StoreResult};
use crate::db::{
    AssignmentWithLawyer, Case, CaseAssignment, CaseDocument, DbPool, NewCase, NewDocument,
    NewUser, Session, User, UserRole, VerificationToken,
};

/// [`Store`] backed by the SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Session row joined with its owner, columns of the user prefixed
#[derive(FromRow)]
struct SessionUserRow {
    id: String,
    user_id: String,
    token_hash: String,
    user_agent: String,
    ip: String,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    user_company_name: String,
    user_email: String,
    user_password_hash: String,
    user_subscription: String,
    user_verified: bool,
    user_role: UserRole,
    user_created_at: DateTime<Utc>,
    user_updated_at: DateTime<Utc>,
}

impl SessionUserRow {
    fn split(self) -> (Session, User) {
        let user = User {
            id: self.user_id.clone(),
            company_name: self.user_company_name,
            email: self.user_email,
            password_hash: self.user_password_hash,
            subscription: self.user_subscription,
            verified: self.user_verified,
            role: self.user_role,
            created_at: self.user_created_at,
            updated_at: self.user_updated_at,
        };
        let session = Session {
            id: self.id,
            user_id: self.user_id,
            token_hash: self.token_hash,
            user_agent: self.user_agent,
            ip: self.ip,
            last_activity: self.last_activity,
            expires_at: self.expires_at,
            created_at: self.created_at,
        };
        (session, user)
    }
}

fn build_document(document: NewDocument, now: DateTime<Utc>) -> CaseDocument {
    CaseDocument {
        id: Uuid::new_v4().to_string(),
        case_id: document.case_id,
        title: document.title,
        owner: document.owner,
        description: document.description,
        status: document.status,
        category: document.category,
        storage_path: document.storage_path,
        created_at: now,
        updated_at: now,
    }
}

const INSERT_DOCUMENT: &str = r#"
    INSERT INTO case_documents
        (id, case_id, title, owner, description, status, category, storage_path, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            company_name: user.company_name,
            email: user.email.to_lowercase(),
            password_hash: user.password_hash,
            subscription: user.subscription,
            verified: false,
            role: user.role,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO users
                (id, company_name, email, password_hash, subscription, verified, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.company_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.subscription)
        .bind(user.verified)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_with_role(&self, id: &str, role: UserRole) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND role = ?")
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn mark_user_verified(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET verified = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        id: &str,
        plan: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE users SET subscription = ?, updated_at = ? WHERE id = ?")
            .bind(plan)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_verification_tokens(&self, user_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_verification_token(&self, token: &VerificationToken) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (id, user_id, code, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                id = excluded.id,
                code = excluded.code,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.code)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_verification_token(
        &self,
        user_id: &str,
        code: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let token = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM verification_tokens WHERE user_id = ? AND code = ?",
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete_verification_token(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, token_hash, user_agent, ip, last_activity, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip)
        .bind(session.last_activity)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session_with_user(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<(Session, User)>> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.id, s.user_id, s.token_hash, s.user_agent, s.ip,
                   s.last_activity, s.expires_at, s.created_at,
                   u.company_name AS user_company_name,
                   u.email AS user_email,
                   u.password_hash AS user_password_hash,
                   u.subscription AS user_subscription,
                   u.verified AS user_verified,
                   u.role AS user_role,
                   u.created_at AS user_created_at,
                   u.updated_at AS user_updated_at
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionUserRow::split))
    }

    async fn touch_session(
        &self,
        id: &str,
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        // Timestamps are stored as uniform RFC 3339 UTC text, so MAX orders them correctly
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity = MAX(last_activity, ?),
                expires_at = MAX(expires_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(last_activity)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session_by_token_hash(&self, token_hash: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_case(
        &self,
        case: NewCase,
        documents: Vec<NewDocument>,
        now: DateTime<Utc>,
    ) -> StoreResult<(Case, Vec<CaseDocument>)> {
        let case = Case {
            id: Uuid::new_v4().to_string(),
            user_id: case.user_id,
            name: case.name,
            priority: case.priority,
            status: case.status,
            matter_type: case.matter_type,
            owner: case.owner,
            summary: case.summary,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cases
                (id, user_id, name, priority, status, matter_type, owner, summary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&case.id)
        .bind(&case.user_id)
        .bind(&case.name)
        .bind(&case.priority)
        .bind(&case.status)
        .bind(&case.matter_type)
        .bind(&case.owner)
        .bind(&case.summary)
        .bind(case.created_at)
        .bind(case.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut created = Vec::with_capacity(documents.len());
        for document in documents {
            let document = build_document(
                NewDocument {
                    case_id: case.id.clone(),
                    ..document
                },
                now,
            );
            sqlx::query(INSERT_DOCUMENT)
                .bind(&document.id)
                .bind(&document.case_id)
                .bind(&document.title)
                .bind(&document.owner)
                .bind(&document.description)
                .bind(&document.status)
                .bind(&document.category)
                .bind(&document.storage_path)
                .bind(document.created_at)
                .bind(document.updated_at)
                .execute(&mut *tx)
                .await?;
            created.push(document);
        }

        tx.commit().await?;
        Ok((case, created))
    }

    async fn find_case(&self, id: &str) -> StoreResult<Option<Case>> {
        let case = sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(case)
    }

    async fn delete_case(&self, id: &str, owner_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cases WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_cases_owned_by(&self, user_id: &str) -> StoreResult<Vec<Case>> {
        let cases = sqlx::query_as::<_, Case>(
            "SELECT * FROM cases WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(cases)
    }

    async fn list_cases_assigned_to(&self, lawyer_id: &str) -> StoreResult<Vec<Case>> {
        let cases = sqlx::query_as::<_, Case>(
            r#"
            SELECT c.* FROM cases c
            INNER JOIN case_assignments a ON a.case_id = c.id
            WHERE a.lawyer_id = ?
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(lawyer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(cases)
    }

    async fn count_owned_cases(&self, case_id: &str, user_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cases WHERE id = ? AND user_id = ?")
            .bind(case_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn count_assignments(&self, case_id: &str, lawyer_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM case_assignments WHERE case_id = ? AND lawyer_id = ?",
        )
        .bind(case_id)
        .bind(lawyer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn find_assignment(
        &self,
        case_id: &str,
        lawyer_id: &str,
    ) -> StoreResult<Option<CaseAssignment>> {
        let assignment = sqlx::query_as::<_, CaseAssignment>(
            "SELECT * FROM case_assignments WHERE case_id = ? AND lawyer_id = ?",
        )
        .bind(case_id)
        .bind(lawyer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(assignment)
    }

    async fn insert_assignment(&self, assignment: &CaseAssignment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO case_assignments (id, case_id, lawyer_id, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assignment.id)
        .bind(&assignment.case_id)
        .bind(&assignment.lawyer_id)
        .bind(&assignment.notes)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_assignment_notes(
        &self,
        id: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE case_assignments SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_assignments(&self, case_id: &str) -> StoreResult<Vec<AssignmentWithLawyer>> {
        let assignments = sqlx::query_as::<_, AssignmentWithLawyer>(
            r#"
            SELECT a.case_id, a.lawyer_id, a.notes, a.created_at,
                   u.company_name AS lawyer_company_name,
                   u.email AS lawyer_email
            FROM case_assignments a
            INNER JOIN users u ON u.id = a.lawyer_id
            WHERE a.case_id = ?
            ORDER BY a.created_at ASC, a.rowid ASC
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(assignments)
    }

    async fn insert_document(
        &self,
        document: NewDocument,
        now: DateTime<Utc>,
    ) -> StoreResult<CaseDocument> {
        let document = build_document(document, now);

        sqlx::query(INSERT_DOCUMENT)
            .bind(&document.id)
            .bind(&document.case_id)
            .bind(&document.title)
            .bind(&document.owner)
            .bind(&document.description)
            .bind(&document.status)
            .bind(&document.category)
            .bind(&document.storage_path)
            .bind(document.created_at)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(document)
    }

    async fn find_document(&self, id: &str, case_id: &str) -> StoreResult<Option<CaseDocument>> {
        let document = sqlx::query_as::<_, CaseDocument>(
            "SELECT * FROM case_documents WHERE id = ? AND case_id = ?",
        )
        .bind(id)
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    async fn delete_document(&self, id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM case_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_documents(&self, case_id: &str) -> StoreResult<Vec<CaseDocument>> {
        let documents = sqlx::query_as::<_, CaseDocument>(
            "SELECT * FROM case_documents WHERE case_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }
}
