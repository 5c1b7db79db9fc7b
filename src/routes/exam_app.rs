use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use crate::dto::exam_app_dto::{
    AuthorizeRequest, AuthorizeResponse, ExamInfoResponse, SessionStatusResponse, StartRequest,
    StartResponse, SubmitRequest, SubmitResponse, ViolationReportRequest,
    ViolationReportResponse,
};
use crate::error::{Error, Result, AUTHORIZATION_FAILED, INVALID_EXAM_CODE, INVALID_OR_EXPIRED};
use crate::middleware::auth::Claims;
use crate::middleware::launch_gate::ProctoredAttempt;
use crate::models::exam::ExamInfo;
use crate::services::attempt_service::SubmitOutcome;
use crate::services::authorization_service::{AuthorizeOutcome, CodeLookup};
use crate::services::launch_session_service::StartOutcome;
use crate::AppState;

fn student_id(claims: &Claims) -> Result<uuid::Uuid> {
    claims
        .user_id()
        .ok_or_else(|| Error::Unauthorized("invalid_session".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/exam-app/code/{code}",
    params(
        ("code" = String, Path, description = "Exam code typed by the student")
    ),
    responses(
        (status = 200, description = "Exam summary", body = ExamInfoResponse),
        (status = 404, description = "Code unknown, inactive, expired or used up"),
    ),
)]
#[axum::debug_handler]
pub async fn get_exam_by_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<ExamInfoResponse>> {
    if code.trim().is_empty() {
        return Err(Error::BadRequest("Exam code is required".to_string()));
    }

    match state
        .authorization_service
        .resolve_code(&code, Utc::now())
        .await?
    {
        CodeLookup::Found { code, teacher } => Ok(Json(ExamInfoResponse {
            success: true,
            error: None,
            exam: Some(ExamInfo::new(&code, &teacher.name)),
        })),
        CodeLookup::InvalidCode => {
            info!(user = %claims.sub, "exam code lookup rejected");
            Err(Error::NotFound(INVALID_EXAM_CODE.to_string()))
        }
        CodeLookup::TeacherNotFound => {
            warn!(user = %claims.sub, "exam code has no owning teacher");
            Err(Error::NotFound(INVALID_EXAM_CODE.to_string()))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/exam-app/authorize",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Authorization issued", body = AuthorizeResponse),
        (status = 400, description = "Missing code or password"),
        (status = 401, description = "Authorization failed"),
        (status = 429, description = "Too many attempts"),
    ),
)]
#[axum::debug_handler]
pub async fn authorize(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>> {
    payload.validate()?;
    let student_id = student_id(&claims)?;

    let outcome = state
        .authorization_service
        .authorize(student_id, &payload.code, &payload.teacher_password, Utc::now())
        .await?;

    match outcome {
        AuthorizeOutcome::Authorized {
            token,
            expires_at,
            exam,
        } => Ok(Json(AuthorizeResponse {
            success: true,
            error: None,
            authorization_token: Some(token),
            expires_at_utc: Some(expires_at),
            exam: Some(exam),
        })),
        rejected => {
            info!(%student_id, reason = ?rejected, "authorize rejected");
            Err(Error::Unauthorized(AUTHORIZATION_FAILED.to_string()))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/exam-app/start",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Launch session issued", body = StartResponse),
        (status = 401, description = "Authorization is invalid or has expired"),
    ),
)]
#[axum::debug_handler]
pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<StartResponse>> {
    payload.validate()?;
    let student_id = student_id(&claims)?;

    match state
        .launch_session_service
        .start(student_id, &payload.authorization_token, Utc::now())
        .await?
    {
        StartOutcome::Started {
            attempt_id,
            kind,
            launch_token,
            expires_at,
        } => Ok(Json(StartResponse {
            success: true,
            error: None,
            attempt_id: Some(attempt_id),
            launch_token: Some(launch_token),
            expires_at_utc: Some(expires_at),
            is_programming_exam: kind.is_programming(),
        })),
        StartOutcome::InvalidOrExpiredAuthorization => {
            Err(Error::Unauthorized(INVALID_OR_EXPIRED.to_string()))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/exam-app/submit",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Attempt completed (or already was)", body = SubmitResponse),
        (status = 404, description = "Attempt not found"),
    ),
)]
#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>> {
    let student_id = student_id(&claims)?;

    match state
        .attempt_service
        .submit(student_id, payload.attempt_id, Utc::now())
        .await?
    {
        SubmitOutcome::Submitted(_) => Ok(Json(SubmitResponse {
            success: true,
            error: None,
        })),
        SubmitOutcome::AlreadyCompleted(_) => {
            info!(attempt_id = %payload.attempt_id, "submit repeated on completed attempt");
            Ok(Json(SubmitResponse {
                success: true,
                error: None,
            }))
        }
        SubmitOutcome::NotFound => Err(Error::NotFound("Attempt not found".to_string())),
    }
}

#[axum::debug_handler]
pub async fn session_status(
    Extension(ProctoredAttempt(attempt)): Extension<ProctoredAttempt>,
) -> Json<SessionStatusResponse> {
    let remaining = (attempt.ends_at() - Utc::now()).num_seconds().max(0);
    Json(SessionStatusResponse {
        success: true,
        valid: true,
        status: attempt.status.as_str().to_string(),
        remaining_seconds: remaining,
        violation_count: attempt.violation_count,
    })
}

#[utoipa::path(
    post,
    path = "/api/exam-app/violations",
    request_body = ViolationReportRequest,
    responses(
        (status = 200, description = "Violation recorded", body = ViolationReportResponse),
        (status = 401, description = "Launch session is invalid or has expired"),
    ),
)]
#[axum::debug_handler]
pub async fn report_violation(
    State(state): State<AppState>,
    Extension(ProctoredAttempt(attempt)): Extension<ProctoredAttempt>,
    Json(payload): Json<ViolationReportRequest>,
) -> Result<Json<ViolationReportResponse>> {
    payload.validate()?;

    let count = state
        .attempt_service
        .record_violation(attempt.attempt_ref())
        .await?;
    warn!(
        attempt_id = %attempt.id,
        student_id = %attempt.student_id,
        kind = %payload.kind,
        detail = payload.detail.as_deref().unwrap_or(""),
        count,
        "violation reported"
    );

    Ok(Json(ViolationReportResponse {
        success: true,
        violation_count: count,
    }))
}
