//! In-memory store, used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::LockdownStore;
use crate::error::{Error, Result};
use crate::models::attempt::{AttemptStatus, ExamAttempt};
use crate::models::authorization::ExamAuthorization;
use crate::models::exam::{AttemptRef, ExamCode, ExamCodeRef, ExamKind};
use crate::models::launch_session::LaunchSession;
use crate::models::user::User;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    codes: HashMap<ExamCodeRef, ExamCode>,
    // (kind, exam id) -> duration minutes
    exam_durations: HashMap<(ExamKind, Uuid), i32>,
    authorizations: Vec<ExamAuthorization>,
    attempts: HashMap<AttemptRef, ExamAttempt>,
    sessions: Vec<LaunchSession>,
}

/// Thread-safe store keeping every table behind a single lock, so each
/// trait call is atomic with respect to the others.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Registers a code together with the duration of the exam it opens.
    pub async fn insert_exam_code(&self, code: ExamCode) {
        let mut tables = self.tables.write().await;
        tables
            .exam_durations
            .insert((code.kind, code.exam_id), code.duration_minutes);
        tables.codes.insert(code.code_ref(), code);
    }

    pub async fn exam_code(&self, code: ExamCodeRef) -> Option<ExamCode> {
        self.tables.read().await.codes.get(&code).cloned()
    }

    pub async fn user(&self, id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    pub async fn authorizations(&self) -> Vec<ExamAuthorization> {
        self.tables.read().await.authorizations.clone()
    }

    /// Inserts an attempt row as-is, e.g. to simulate one finished elsewhere.
    pub async fn put_attempt(&self, attempt: ExamAttempt) {
        self.tables
            .write()
            .await
            .attempts
            .insert(attempt.attempt_ref(), attempt);
    }

    pub async fn sessions_for(&self, attempt: AttemptRef, student_id: Uuid) -> Vec<LaunchSession> {
        self.tables
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.attempt == attempt && s.student_id == student_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LockdownStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        failed_count: i32,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
        user.failed_login_count = failed_count;
        user.lockout_end = lockout_end;
        Ok(())
    }

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.failed_login_count = 0;
            user.lockout_end = None;
        }
        Ok(())
    }

    async fn find_exam_code(&self, kind: ExamKind, code: &str) -> Result<Option<ExamCode>> {
        Ok(self
            .tables
            .read()
            .await
            .codes
            .values()
            .find(|c| c.kind == kind && c.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn find_exam_code_by_ref(&self, code: ExamCodeRef) -> Result<Option<ExamCode>> {
        Ok(self.tables.read().await.codes.get(&code).cloned())
    }

    async fn increment_code_use(&self, code: ExamCodeRef) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(c) = tables.codes.get_mut(&code) {
            c.use_count += 1;
        }
        Ok(())
    }

    async fn insert_authorization(&self, authorization: &ExamAuthorization) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .authorizations
            .iter()
            .any(|a| a.token_hash == authorization.token_hash)
        {
            return Err(Error::Internal("duplicate authorization token hash".to_string()));
        }
        tables.authorizations.push(authorization.clone());
        Ok(())
    }

    async fn consume_authorization(
        &self,
        student_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAuthorization>> {
        let mut tables = self.tables.write().await;
        let found = tables.authorizations.iter_mut().find(|a| {
            a.student_id == student_id && a.token_hash == token_hash && a.is_consumable(now)
        });
        Ok(found.map(|a| {
            a.used_at = Some(now);
            a.clone()
        }))
    }

    async fn find_in_progress_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>> {
        Ok(self
            .tables
            .read()
            .await
            .attempts
            .values()
            .filter(|a| {
                a.kind == kind
                    && a.exam_id == exam_id
                    && a.student_id == student_id
                    && a.is_in_progress()
            })
            .max_by_key(|a| a.started_at)
            .cloned())
    }

    async fn create_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
        exam_code_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt> {
        let mut tables = self.tables.write().await;
        let duration_minutes = *tables
            .exam_durations
            .get(&(kind, exam_id))
            .ok_or_else(|| Error::NotFound("Exam not found".to_string()))?;
        let attempt = ExamAttempt {
            id: Uuid::new_v4(),
            kind,
            exam_id,
            student_id,
            exam_code_id,
            status: AttemptStatus::InProgress,
            started_at,
            completed_at: None,
            duration_minutes,
            violation_count: 0,
        };
        tables.attempts.insert(attempt.attempt_ref(), attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt: AttemptRef) -> Result<Option<ExamAttempt>> {
        Ok(self.tables.read().await.attempts.get(&attempt).cloned())
    }

    async fn complete_attempt(
        &self,
        attempt: AttemptRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAttempt>> {
        let mut tables = self.tables.write().await;
        Ok(tables.attempts.get_mut(&attempt).map(|a| {
            if a.is_in_progress() {
                a.status = AttemptStatus::Completed;
                a.completed_at = Some(now);
            }
            a.clone()
        }))
    }

    async fn increment_violations(&self, attempt: AttemptRef) -> Result<i32> {
        let mut tables = self.tables.write().await;
        let a = tables
            .attempts
            .get_mut(&attempt)
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;
        a.violation_count += 1;
        Ok(a.violation_count)
    }

    async fn revoke_sessions(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for s in tables
            .sessions
            .iter_mut()
            .filter(|s| s.attempt == attempt && s.student_id == student_id && s.is_live(now))
        {
            s.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn insert_session(&self, session: &LaunchSession) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.sessions.iter().any(|s| s.token_hash == session.token_hash) {
            return Err(Error::Internal("duplicate session token hash".to_string()));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<LaunchSession>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .iter()
            .find(|s| {
                s.attempt == attempt && s.student_id == student_id && s.token_hash == token_hash
            })
            .cloned())
    }
}
