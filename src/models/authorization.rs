use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::exam::ExamCodeRef;

/// A teacher-approved permission for one student to start one exam code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAuthorization {
    pub id: Uuid,
    pub student_id: Uuid,
    pub exam_code: ExamCodeRef,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub authorized_by_teacher_id: Uuid,
}

impl ExamAuthorization {
    /// Unused and not yet expired.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
