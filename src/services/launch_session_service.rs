//! Exchanges authorizations for launch sessions and gates proctored requests.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LockdownPolicy;
use crate::database::SharedStore;
use crate::error::Result;
use crate::models::attempt::ExamAttempt;
use crate::models::exam::{AttemptRef, ExamKind};
use crate::models::launch_session::LaunchSession;
use crate::services::attempt_service::AttemptService;
use crate::services::token_service::{generate_token, hash_token};

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        attempt_id: Uuid,
        kind: ExamKind,
        launch_token: String,
        expires_at: DateTime<Utc>,
    },
    InvalidOrExpiredAuthorization,
}

/// Why a launch token was refused. Logged, never returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    UnknownToken,
    Revoked,
    Expired,
    AttemptNotInProgress,
}

#[derive(Clone)]
pub struct LaunchSessionService {
    store: SharedStore,
    attempts: AttemptService,
    policy: LockdownPolicy,
}

impl LaunchSessionService {
    pub fn new(store: SharedStore, attempts: AttemptService, policy: LockdownPolicy) -> Self {
        Self {
            store,
            attempts,
            policy,
        }
    }

    /// Session end: attempt end plus grace, never earlier than the minimum window from now.
    pub fn session_expiry(&self, attempt: &ExamAttempt, now: DateTime<Utc>) -> DateTime<Utc> {
        let by_exam = attempt.ends_at() + Duration::minutes(self.policy.session_grace_minutes);
        let floor = now + Duration::minutes(self.policy.session_min_minutes);
        by_exam.max(floor)
    }

    pub async fn start(
        &self,
        student_id: Uuid,
        authorization_token: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome> {
        let token_hash = hash_token(authorization_token.trim());

        // Consume first: the conditional write is what makes the token single-use.
        let Some(authorization) = self
            .store
            .consume_authorization(student_id, &token_hash, now)
            .await?
        else {
            warn!(%student_id, "start with unknown, used or expired authorization");
            return Ok(StartOutcome::InvalidOrExpiredAuthorization);
        };

        let Some(exam_code) = self
            .store
            .find_exam_code_by_ref(authorization.exam_code)
            .await?
        else {
            warn!(authorization_id = %authorization.id, "authorized exam code no longer exists");
            return Ok(StartOutcome::InvalidOrExpiredAuthorization);
        };

        let started = self
            .attempts
            .start_or_resume(student_id, exam_code.exam_id, authorization.exam_code, now)
            .await?;
        let attempt = started.attempt;
        let attempt_ref = attempt.attempt_ref();
        let expires_at = self.session_expiry(&attempt, now);

        let revoked = self
            .store
            .revoke_sessions(attempt_ref, student_id, now)
            .await?;

        let launch_token = generate_token();
        let session = LaunchSession {
            id: Uuid::new_v4(),
            attempt: attempt_ref,
            student_id,
            token_hash: hash_token(&launch_token),
            created_at: now,
            expires_at,
            revoked_at: None,
        };
        self.store.insert_session(&session).await?;

        info!(
            session_id = %session.id,
            attempt_id = %attempt.id,
            %student_id,
            resumed = started.resumed,
            revoked,
            %expires_at,
            "launch session issued"
        );

        Ok(StartOutcome::Started {
            attempt_id: attempt.id,
            kind: attempt.kind,
            launch_token,
            expires_at,
        })
    }

    /// Checks a launch token; `Err` carries the reason for logging only.
    pub async fn check_launch_token(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        token: &str,
        is_programming_exam: bool,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<ExamAttempt, SessionRejection>> {
        let attempt_ref = AttemptRef::new(ExamKind::from_programming_flag(is_programming_exam), attempt_id);
        let token_hash = hash_token(token.trim());

        let Some(session) = self
            .store
            .find_session(attempt_ref, student_id, &token_hash)
            .await?
        else {
            return Ok(Err(SessionRejection::UnknownToken));
        };
        if session.revoked_at.is_some() {
            return Ok(Err(SessionRejection::Revoked));
        }
        if session.expires_at <= now {
            return Ok(Err(SessionRejection::Expired));
        }

        match self.attempts.find(attempt_ref).await? {
            Some(attempt) if attempt.is_in_progress() => Ok(Ok(attempt)),
            _ => Ok(Err(SessionRejection::AttemptNotInProgress)),
        }
    }

    pub async fn validate_launch_token(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        token: &str,
        is_programming_exam: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let checked = self
            .check_launch_token(attempt_id, student_id, token, is_programming_exam, now)
            .await?;
        if let Err(reason) = checked {
            info!(%attempt_id, %student_id, ?reason, "launch token rejected");
        }
        Ok(checked.is_ok())
    }
}
