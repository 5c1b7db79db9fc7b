pub mod account;
pub mod exam_app;
pub mod health;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::middleware::{auth, launch_gate, rate_limit};
use crate::AppState;

/// Builds every route with its middleware. Outer layers (tracing, CORS) are
/// added by the caller.
pub fn router(state: AppState) -> Router {
    let account = Router::new()
        .route("/Account/ProcessLogin", post(account::process_login))
        .route("/Account/Logout", post(account::logout));

    // Layers added later run first: session, then per-user limit.
    let authorize = Router::new()
        .route("/api/exam-app/authorize", post(exam_app::authorize))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::limit_per_user));

    let proctored = Router::new()
        .route("/api/exam-app/session", get(exam_app::session_status))
        .route("/api/exam-app/violations", post(exam_app::report_violation))
        .route_layer(from_fn_with_state(
            state.clone(),
            launch_gate::require_launch_session,
        ));

    let exam_app = Router::new()
        .route("/api/exam-app/code/:code", get(exam_app::get_exam_by_code))
        .route("/api/exam-app/start", post(exam_app::start))
        .route("/api/exam-app/submit", post(exam_app::submit))
        .merge(authorize)
        .merge(proctored)
        .route_layer(from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .route("/health", get(health::health))
        .merge(account)
        .merge(exam_app)
        .with_state(state)
}
