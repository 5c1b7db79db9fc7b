use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::database::SharedStore;
use crate::error::Result;
use crate::models::attempt::ExamAttempt;
use crate::models::exam::{AttemptRef, ExamCodeRef, ExamKind};

#[derive(Debug, Clone, PartialEq)]
pub struct StartedAttempt {
    pub attempt: ExamAttempt,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(ExamAttempt),
    AlreadyCompleted(ExamAttempt),
    NotFound,
}

/// Exam-attempt collaborator: creation, resumption and completion.
#[derive(Clone)]
pub struct AttemptService {
    store: SharedStore,
}

impl AttemptService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Reuses the student's in-progress attempt for this exam when one
    /// exists, so restarting after a crash does not open a second attempt.
    pub async fn start_or_resume(
        &self,
        student_id: Uuid,
        exam_id: Uuid,
        code: ExamCodeRef,
        now: DateTime<Utc>,
    ) -> Result<StartedAttempt> {
        if let Some(attempt) = self
            .store
            .find_in_progress_attempt(code.kind, exam_id, student_id)
            .await?
        {
            info!(attempt_id = %attempt.id, %student_id, "resuming in-progress attempt");
            return Ok(StartedAttempt {
                attempt,
                resumed: true,
            });
        }

        let attempt = self
            .store
            .create_attempt(code.kind, exam_id, student_id, code.id, now)
            .await?;
        self.store.increment_code_use(code).await?;
        info!(attempt_id = %attempt.id, %student_id, kind = code.kind.as_str(), "attempt started");
        Ok(StartedAttempt {
            attempt,
            resumed: false,
        })
    }

    pub async fn find(&self, attempt: AttemptRef) -> Result<Option<ExamAttempt>> {
        self.store.find_attempt(attempt).await
    }

    /// Finds an attempt by id in either exam kind, restricted to its owner.
    pub async fn find_owned(&self, student_id: Uuid, attempt_id: Uuid) -> Result<Option<ExamAttempt>> {
        for kind in ExamKind::LOOKUP_ORDER {
            if let Some(attempt) = self
                .store
                .find_attempt(AttemptRef::new(kind, attempt_id))
                .await?
            {
                return Ok((attempt.student_id == student_id).then_some(attempt));
            }
        }
        Ok(None)
    }

    /// Completes the attempt. Safe to repeat: a completed attempt stays as it is.
    pub async fn submit(
        &self,
        student_id: Uuid,
        attempt_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        let Some(attempt) = self.find_owned(student_id, attempt_id).await? else {
            return Ok(SubmitOutcome::NotFound);
        };
        if !attempt.is_in_progress() {
            return Ok(SubmitOutcome::AlreadyCompleted(attempt));
        }

        match self
            .store
            .complete_attempt(attempt.attempt_ref(), now)
            .await?
        {
            Some(done) => {
                info!(%attempt_id, %student_id, "attempt submitted");
                Ok(SubmitOutcome::Submitted(done))
            }
            None => Ok(SubmitOutcome::NotFound),
        }
    }

    pub async fn record_violation(&self, attempt: AttemptRef) -> Result<i32> {
        self.store.increment_violations(attempt).await
    }
}
