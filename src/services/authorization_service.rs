//! Teacher-vouched authorizations for starting a proctored exam.
//!
//! `Requested -> Authorized(unused) -> Consumed`, or `-> Expired` when the
//! TTL lapses first. Consumption happens in the launch session service.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LockdownPolicy;
use crate::database::SharedStore;
use crate::error::Result;
use crate::models::authorization::ExamAuthorization;
use crate::models::exam::{ExamCode, ExamInfo, ExamKind};
use crate::models::user::User;
use crate::services::identity_service::{IdentityService, PasswordCheck};
use crate::services::token_service::{generate_token, hash_token};

#[derive(Debug, Clone, PartialEq)]
pub enum CodeLookup {
    Found { code: ExamCode, teacher: User },
    InvalidCode,
    TeacherNotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizeOutcome {
    Authorized {
        token: String,
        expires_at: DateTime<Utc>,
        exam: ExamInfo,
    },
    InvalidCode,
    TeacherNotFound,
    AuthFailed,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Clone)]
pub struct AuthorizationService {
    store: SharedStore,
    identity: IdentityService,
    policy: LockdownPolicy,
}

impl AuthorizationService {
    pub fn new(store: SharedStore, identity: IdentityService, policy: LockdownPolicy) -> Self {
        Self {
            store,
            identity,
            policy,
        }
    }

    /// Resolves a code across both exam kinds and the teacher who owns it.
    pub async fn resolve_code(&self, code: &str, now: DateTime<Utc>) -> Result<CodeLookup> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(CodeLookup::InvalidCode);
        }

        let mut found = None;
        for kind in ExamKind::LOOKUP_ORDER {
            if let Some(c) = self.store.find_exam_code(kind, &code).await? {
                found = Some(c);
                break;
            }
        }

        let Some(exam_code) = found else {
            info!(%code, "exam code not found");
            return Ok(CodeLookup::InvalidCode);
        };
        if let Err(reason) = exam_code.check_usable(now) {
            info!(%code, kind = exam_code.kind.as_str(), ?reason, "exam code not usable");
            return Ok(CodeLookup::InvalidCode);
        }

        match self.store.find_user_by_id(exam_code.teacher_id).await? {
            Some(teacher) if teacher.role == "teacher" || teacher.role == "admin" => {
                Ok(CodeLookup::Found {
                    code: exam_code,
                    teacher,
                })
            }
            _ => {
                warn!(%code, teacher_id = %exam_code.teacher_id, "exam code owner is missing");
                Ok(CodeLookup::TeacherNotFound)
            }
        }
    }

    pub async fn authorize(
        &self,
        student_id: Uuid,
        code: &str,
        teacher_password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizeOutcome> {
        let (exam_code, teacher) = match self.resolve_code(code, now).await? {
            CodeLookup::Found { code, teacher } => (code, teacher),
            CodeLookup::InvalidCode => return Ok(AuthorizeOutcome::InvalidCode),
            CodeLookup::TeacherNotFound => return Ok(AuthorizeOutcome::TeacherNotFound),
        };

        if teacher_password.is_empty() {
            return Ok(AuthorizeOutcome::AuthFailed);
        }
        match self
            .identity
            .check_password(&teacher, teacher_password, now)
            .await?
        {
            PasswordCheck::Valid => {}
            check => {
                warn!(%student_id, teacher_id = %teacher.id, ?check, "teacher password rejected");
                return Ok(AuthorizeOutcome::AuthFailed);
            }
        }

        let token = generate_token();
        let expires_at = now + Duration::minutes(self.policy.authorization_ttl_minutes);
        let authorization = ExamAuthorization {
            id: Uuid::new_v4(),
            student_id,
            exam_code: exam_code.code_ref(),
            token_hash: hash_token(&token),
            created_at: now,
            expires_at,
            used_at: None,
            authorized_by_teacher_id: teacher.id,
        };
        self.store.insert_authorization(&authorization).await?;

        info!(
            authorization_id = %authorization.id,
            %student_id,
            kind = exam_code.kind.as_str(),
            %expires_at,
            "exam launch authorized"
        );

        Ok(AuthorizeOutcome::Authorized {
            token,
            expires_at,
            exam: ExamInfo::new(&exam_code, &teacher.name),
        })
    }
}
