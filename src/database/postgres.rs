use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::store::LockdownStore;
use crate::error::{Error, Result};
use crate::models::attempt::{AttemptStatus, ExamAttempt};
use crate::models::authorization::ExamAuthorization;
use crate::models::exam::{AttemptRef, ExamCode, ExamCodeRef, ExamKind};
use crate::models::launch_session::LaunchSession;
use crate::models::user::User;

/// Table and column names of one exam kind.
struct KindTables {
    exams: &'static str,
    codes: &'static str,
    code_exam_col: &'static str,
    attempts: &'static str,
    attempt_exam_col: &'static str,
    attempt_code_col: &'static str,
    session_attempt_col: &'static str,
}

fn tables(kind: ExamKind) -> KindTables {
    match kind {
        ExamKind::Standard => KindTables {
            exams: "exams",
            codes: "exam_codes",
            code_exam_col: "exam_id",
            attempts: "exam_attempts",
            attempt_exam_col: "exam_id",
            attempt_code_col: "exam_code_id",
            session_attempt_col: "exam_attempt_id",
        },
        ExamKind::Programming => KindTables {
            exams: "programming_exams",
            codes: "programming_exam_codes",
            code_exam_col: "programming_exam_id",
            attempts: "programming_exam_attempts",
            attempt_exam_col: "programming_exam_id",
            attempt_code_col: "programming_exam_code_id",
            session_attempt_col: "programming_exam_attempt_id",
        },
    }
}

#[derive(Debug, FromRow)]
struct ExamCodeRow {
    id: Uuid,
    exam_id: Uuid,
    code: String,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
    use_count: i32,
    exam_title: String,
    course_name: String,
    duration_minutes: i32,
    teacher_id: Uuid,
}

impl ExamCodeRow {
    fn into_domain(self, kind: ExamKind) -> ExamCode {
        ExamCode {
            id: self.id,
            kind,
            exam_id: self.exam_id,
            code: self.code,
            is_active: self.is_active,
            expires_at: self.expires_at,
            max_uses: self.max_uses,
            use_count: self.use_count,
            exam_title: self.exam_title,
            course_name: self.course_name,
            duration_minutes: self.duration_minutes,
            teacher_id: self.teacher_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuthorizationRow {
    id: Uuid,
    student_id: Uuid,
    exam_code_id: Option<Uuid>,
    programming_exam_code_id: Option<Uuid>,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    authorized_by_teacher_id: Uuid,
}

impl TryFrom<AuthorizationRow> for ExamAuthorization {
    type Error = Error;

    fn try_from(row: AuthorizationRow) -> Result<Self> {
        let exam_code = ExamCodeRef::from_columns(row.exam_code_id, row.programming_exam_code_id)
            .ok_or_else(|| {
                Error::Internal(format!("authorization {} references no single exam code", row.id))
            })?;
        Ok(ExamAuthorization {
            id: row.id,
            student_id: row.student_id,
            exam_code,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
            authorized_by_teacher_id: row.authorized_by_teacher_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    exam_id: Uuid,
    student_id: Uuid,
    exam_code_id: Uuid,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_minutes: i32,
    violation_count: i32,
}

impl AttemptRow {
    fn into_domain(self, kind: ExamKind) -> Result<ExamAttempt> {
        let status: AttemptStatus = self.status.parse().map_err(Error::Internal)?;
        Ok(ExamAttempt {
            id: self.id,
            kind,
            exam_id: self.exam_id,
            student_id: self.student_id,
            exam_code_id: self.exam_code_id,
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_minutes: self.duration_minutes,
            violation_count: self.violation_count,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    exam_attempt_id: Option<Uuid>,
    programming_exam_attempt_id: Option<Uuid>,
    student_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for LaunchSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let attempt = AttemptRef::from_columns(row.exam_attempt_id, row.programming_exam_attempt_id)
            .ok_or_else(|| {
                Error::Internal(format!("launch session {} references no single attempt", row.id))
            })?;
        Ok(LaunchSession {
            id: row.id,
            attempt,
            student_id: row.student_id,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, name, role, password_hash, failed_login_count, lockout_end";

const AUTHORIZATION_COLUMNS: &str = "id, student_id, exam_code_id, programming_exam_code_id, \
     token_hash, created_at, expires_at, used_at, authorized_by_teacher_id";

const SESSION_COLUMNS: &str = "id, exam_attempt_id, programming_exam_attempt_id, student_id, \
     token_hash, created_at, expires_at, revoked_at";

fn code_select(t: &KindTables) -> String {
    format!(
        "SELECT c.id, c.{exam_col} AS exam_id, c.code, c.is_active, c.expires_at, c.max_uses, \
         c.use_count, e.title AS exam_title, e.course_name, e.duration_minutes, e.teacher_id \
         FROM {codes} c JOIN {exams} e ON e.id = c.{exam_col}",
        exam_col = t.code_exam_col,
        codes = t.codes,
        exams = t.exams,
    )
}

fn attempt_select(t: &KindTables) -> String {
    format!(
        "SELECT a.id, a.{exam_col} AS exam_id, a.student_id, a.{code_col} AS exam_code_id, \
         a.status, a.started_at, a.completed_at, e.duration_minutes, a.violation_count \
         FROM {attempts} a JOIN {exams} e ON e.id = a.{exam_col}",
        exam_col = t.attempt_exam_col,
        code_col = t.attempt_code_col,
        attempts = t.attempts,
        exams = t.exams,
    )
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LockdownStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        failed_count: i32,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET failed_login_count = $2, lockout_end = $3 WHERE id = $1")
            .bind(user_id)
            .bind(failed_count)
            .bind(lockout_end)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET failed_login_count = 0, lockout_end = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_exam_code(&self, kind: ExamKind, code: &str) -> Result<Option<ExamCode>> {
        let t = tables(kind);
        let sql = format!("{} WHERE UPPER(c.code) = UPPER($1)", code_select(&t));
        let row = sqlx::query_as::<_, ExamCodeRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain(kind)))
    }

    async fn find_exam_code_by_ref(&self, code: ExamCodeRef) -> Result<Option<ExamCode>> {
        let t = tables(code.kind);
        let sql = format!("{} WHERE c.id = $1", code_select(&t));
        let row = sqlx::query_as::<_, ExamCodeRow>(&sql)
            .bind(code.id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_domain(code.kind)))
    }

    async fn increment_code_use(&self, code: ExamCodeRef) -> Result<()> {
        let t = tables(code.kind);
        sqlx::query(&format!(
            "UPDATE {} SET use_count = use_count + 1 WHERE id = $1",
            t.codes
        ))
        .bind(code.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_authorization(&self, authorization: &ExamAuthorization) -> Result<()> {
        let (standard, programming) = authorization.exam_code.to_columns();
        sqlx::query(
            r#"
            INSERT INTO exam_authorizations (
                id, student_id, exam_code_id, programming_exam_code_id, token_hash,
                created_at, expires_at, used_at, authorized_by_teacher_id, is_programming_exam
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(authorization.id)
        .bind(authorization.student_id)
        .bind(standard)
        .bind(programming)
        .bind(&authorization.token_hash)
        .bind(authorization.created_at)
        .bind(authorization.expires_at)
        .bind(authorization.used_at)
        .bind(authorization.authorized_by_teacher_id)
        .bind(authorization.exam_code.kind.is_programming())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_authorization(
        &self,
        student_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAuthorization>> {
        let row = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "UPDATE exam_authorizations SET used_at = $3 \
             WHERE student_id = $1 AND token_hash = $2 AND used_at IS NULL AND expires_at > $3 \
             RETURNING {}",
            AUTHORIZATION_COLUMNS
        ))
        .bind(student_id)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamAuthorization::try_from).transpose()
    }

    async fn find_in_progress_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>> {
        let t = tables(kind);
        let sql = format!(
            "{} WHERE a.{} = $1 AND a.student_id = $2 AND a.status = 'in_progress' \
             ORDER BY a.started_at DESC LIMIT 1",
            attempt_select(&t),
            t.attempt_exam_col
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exam_id)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_domain(kind)).transpose()
    }

    async fn create_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
        exam_code_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt> {
        let t = tables(kind);
        let id = Uuid::new_v4();
        sqlx::query(&format!(
            "INSERT INTO {} (id, {}, student_id, {}, status, started_at) \
             VALUES ($1, $2, $3, $4, 'in_progress', $5)",
            t.attempts, t.attempt_exam_col, t.attempt_code_col
        ))
        .bind(id)
        .bind(exam_id)
        .bind(student_id)
        .bind(exam_code_id)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        self.find_attempt(AttemptRef::new(kind, id))
            .await?
            .ok_or_else(|| Error::Internal(format!("attempt {} vanished after insert", id)))
    }

    async fn find_attempt(&self, attempt: AttemptRef) -> Result<Option<ExamAttempt>> {
        let t = tables(attempt.kind);
        let sql = format!("{} WHERE a.id = $1", attempt_select(&t));
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt.id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_domain(attempt.kind)).transpose()
    }

    async fn complete_attempt(
        &self,
        attempt: AttemptRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAttempt>> {
        let t = tables(attempt.kind);
        sqlx::query(&format!(
            "UPDATE {} SET status = 'completed', completed_at = $2 \
             WHERE id = $1 AND status = 'in_progress'",
            t.attempts
        ))
        .bind(attempt.id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.find_attempt(attempt).await
    }

    async fn increment_violations(&self, attempt: AttemptRef) -> Result<i32> {
        let t = tables(attempt.kind);
        let count: i32 = sqlx::query_scalar(&format!(
            "UPDATE {} SET violation_count = violation_count + 1 WHERE id = $1 \
             RETURNING violation_count",
            t.attempts
        ))
        .bind(attempt.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn revoke_sessions(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let t = tables(attempt.kind);
        let result = sqlx::query(&format!(
            "UPDATE exam_launch_sessions SET revoked_at = $3 \
             WHERE {} = $1 AND student_id = $2 AND revoked_at IS NULL AND expires_at > $3",
            t.session_attempt_col
        ))
        .bind(attempt.id)
        .bind(student_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_session(&self, session: &LaunchSession) -> Result<()> {
        let (standard, programming) = session.attempt.to_columns();
        sqlx::query(
            r#"
            INSERT INTO exam_launch_sessions (
                id, exam_attempt_id, programming_exam_attempt_id, student_id, token_hash,
                created_at, expires_at, revoked_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(standard)
        .bind(programming)
        .bind(session.student_id)
        .bind(&session.token_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<LaunchSession>> {
        let t = tables(attempt.kind);
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_launch_sessions \
             WHERE {} = $1 AND student_id = $2 AND token_hash = $3",
            SESSION_COLUMNS, t.session_attempt_col
        ))
        .bind(attempt.id)
        .bind(student_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LaunchSession::try_from).transpose()
    }
}
