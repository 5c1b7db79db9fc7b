use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which exam table family a code, attempt or session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamKind {
    Standard,
    Programming,
}

impl ExamKind {
    /// Lookup order when a bare code arrives from a client.
    pub const LOOKUP_ORDER: [ExamKind; 2] = [ExamKind::Standard, ExamKind::Programming];

    pub fn from_programming_flag(is_programming: bool) -> Self {
        if is_programming {
            ExamKind::Programming
        } else {
            ExamKind::Standard
        }
    }

    pub fn is_programming(self) -> bool {
        matches!(self, ExamKind::Programming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExamKind::Standard => "standard",
            ExamKind::Programming => "programming",
        }
    }
}

/// Reference to an exam code of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExamCodeRef {
    pub kind: ExamKind,
    pub id: Uuid,
}

impl ExamCodeRef {
    /// Splits into the `(standard, programming)` column pair used by storage.
    pub fn to_columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self.kind {
            ExamKind::Standard => (Some(self.id), None),
            ExamKind::Programming => (None, Some(self.id)),
        }
    }

    /// Rebuilds the reference from the column pair. Exactly one side must be set.
    pub fn from_columns(standard: Option<Uuid>, programming: Option<Uuid>) -> Option<Self> {
        match (standard, programming) {
            (Some(id), None) => Some(Self { kind: ExamKind::Standard, id }),
            (None, Some(id)) => Some(Self { kind: ExamKind::Programming, id }),
            _ => None,
        }
    }
}

/// Reference to an exam attempt of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptRef {
    pub kind: ExamKind,
    pub id: Uuid,
}

impl AttemptRef {
    pub fn new(kind: ExamKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn to_columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self.kind {
            ExamKind::Standard => (Some(self.id), None),
            ExamKind::Programming => (None, Some(self.id)),
        }
    }

    pub fn from_columns(standard: Option<Uuid>, programming: Option<Uuid>) -> Option<Self> {
        match (standard, programming) {
            (Some(id), None) => Some(Self::new(ExamKind::Standard, id)),
            (None, Some(id)) => Some(Self::new(ExamKind::Programming, id)),
            _ => None,
        }
    }
}

/// An exam code joined with the exam it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamCode {
    pub id: Uuid,
    pub kind: ExamKind,
    pub exam_id: Uuid,
    pub code: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub exam_title: String,
    pub course_name: String,
    pub duration_minutes: i32,
    pub teacher_id: Uuid,
}

/// Reason an exam code cannot be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRejection {
    Inactive,
    Expired,
    Exhausted,
}

impl ExamCode {
    pub fn code_ref(&self) -> ExamCodeRef {
        ExamCodeRef { kind: self.kind, id: self.id }
    }

    pub fn check_usable(&self, now: DateTime<Utc>) -> std::result::Result<(), CodeRejection> {
        if !self.is_active {
            return Err(CodeRejection::Inactive);
        }
        if matches!(self.expires_at, Some(expires_at) if expires_at <= now) {
            return Err(CodeRejection::Expired);
        }
        if matches!(self.max_uses, Some(max) if self.use_count >= max) {
            return Err(CodeRejection::Exhausted);
        }
        Ok(())
    }
}

/// Exam metadata shown to the student and teacher before authorizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInfo {
    pub exam_id: Uuid,
    pub exam_code_id: Uuid,
    pub exam_title: String,
    pub course_name: String,
    pub duration_minutes: i32,
    pub teacher_name: String,
    pub is_programming_exam: bool,
}

impl ExamInfo {
    pub fn new(code: &ExamCode, teacher_name: &str) -> Self {
        Self {
            exam_id: code.exam_id,
            exam_code_id: code.id,
            exam_title: code.exam_title.clone(),
            course_name: code.course_name.clone(),
            duration_minutes: code.duration_minutes,
            teacher_name: teacher_name.to_string(),
            is_programming_exam: code.kind.is_programming(),
        }
    }
}
