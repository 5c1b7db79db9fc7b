//! Gate for proctored routes: the request must carry a live launch session.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use tracing::info;

use crate::dto::exam_app_dto::LaunchQuery;
use crate::error::{Error, INVALID_OR_EXPIRED};
use crate::middleware::auth::Claims;
use crate::models::attempt::ExamAttempt;
use crate::AppState;

/// The attempt a validated launch session belongs to.
#[derive(Debug, Clone)]
pub struct ProctoredAttempt(pub ExamAttempt);

pub async fn require_launch_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Option<Query<LaunchQuery>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(Query(launch)) = query else {
        return Error::Unauthorized(INVALID_OR_EXPIRED.to_string()).into_response();
    };
    let Some(student_id) = claims.user_id() else {
        return Error::Unauthorized(INVALID_OR_EXPIRED.to_string()).into_response();
    };

    let checked = state
        .launch_session_service
        .check_launch_token(
            launch.attempt_id,
            student_id,
            &launch.launch_token,
            launch.programming,
            Utc::now(),
        )
        .await;

    match checked {
        Ok(Ok(attempt)) => {
            req.extensions_mut().insert(ProctoredAttempt(attempt));
            next.run(req).await
        }
        Ok(Err(reason)) => {
            info!(attempt_id = %launch.attempt_id, %student_id, ?reason, "proctored request refused");
            Error::Unauthorized(INVALID_OR_EXPIRED.to_string()).into_response()
        }
        Err(e) => e.into_response(),
    }
}
