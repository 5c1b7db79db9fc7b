//! Storage seam for the lockdown core.
//!
//! Authorization and session rows, the exam codes they reference and the
//! attempt/identity records owned by neighbouring collaborators all go
//! through [`LockdownStore`]. Implementations translate [`ExamKind`] into the
//! paired nullable columns and back; nothing above this layer sees them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::ExamAttempt;
use crate::models::authorization::ExamAuthorization;
use crate::models::exam::{AttemptRef, ExamCode, ExamCodeRef, ExamKind};
use crate::models::launch_session::LaunchSession;
use crate::models::user::User;

pub type SharedStore = Arc<dyn LockdownStore>;

#[async_trait]
pub trait LockdownStore: Send + Sync {
    // ---- identity ----

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        failed_count: i32,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<()>;

    // ---- exam codes ----

    /// Looks a code up in the table family of `kind` only.
    async fn find_exam_code(&self, kind: ExamKind, code: &str) -> Result<Option<ExamCode>>;

    async fn find_exam_code_by_ref(&self, code: ExamCodeRef) -> Result<Option<ExamCode>>;

    async fn increment_code_use(&self, code: ExamCodeRef) -> Result<()>;

    // ---- authorizations ----

    async fn insert_authorization(&self, authorization: &ExamAuthorization) -> Result<()>;

    /// Marks the matching unused, unexpired authorization as used and returns it.
    ///
    /// Must be a single conditional write: of any number of concurrent calls
    /// with the same hash at most one returns `Some`.
    async fn consume_authorization(
        &self,
        student_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAuthorization>>;

    // ---- attempts ----

    async fn find_in_progress_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>>;

    async fn create_attempt(
        &self,
        kind: ExamKind,
        exam_id: Uuid,
        student_id: Uuid,
        exam_code_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt>;

    async fn find_attempt(&self, attempt: AttemptRef) -> Result<Option<ExamAttempt>>;

    /// Moves an in-progress attempt to completed. Already-completed attempts
    /// are returned unchanged.
    async fn complete_attempt(
        &self,
        attempt: AttemptRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamAttempt>>;

    /// Returns the new violation count.
    async fn increment_violations(&self, attempt: AttemptRef) -> Result<i32>;

    // ---- launch sessions ----

    /// Revokes every session for the pair that is not already revoked or expired.
    async fn revoke_sessions(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn insert_session(&self, session: &LaunchSession) -> Result<()>;

    async fn find_session(
        &self,
        attempt: AttemptRef,
        student_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<LaunchSession>>;
}
