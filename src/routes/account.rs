use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use chrono::{Duration, Utc};
use validator::Validate;

use crate::dto::account_dto::LoginForm;
use crate::error::Result;
use crate::middleware::auth::{expired_session_cookie, issue_session_token, session_cookie};
use crate::services::identity_service::SignInResult;
use crate::AppState;

const REMEMBERED_SESSION_DAYS: i64 = 30;
const SESSION_HOURS: i64 = 12;

fn login_page(error: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><head><title>Log in</title></head><body>\
         <form method=\"post\" action=\"/Account/ProcessLogin\">\
         <div class=\"validation-summary-errors\">{}</div>\
         <input name=\"email\" type=\"email\"/>\
         <input name=\"password\" type=\"password\"/>\
         <input name=\"rememberMe\" type=\"checkbox\" value=\"true\"/>\
         <button type=\"submit\">Log in</button></form></body></html>",
        error
    );
    (StatusCode::OK, Html(body)).into_response()
}

#[axum::debug_handler]
pub async fn process_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if form.validate().is_err() {
        return Ok(login_page("Email and password are required."));
    }

    let user = match state
        .identity_service
        .password_sign_in(&form.email, &form.password, Utc::now())
        .await?
    {
        SignInResult::Success(user) => user,
        SignInResult::Failed => return Ok(login_page("Invalid login attempt.")),
        SignInResult::LockedOut => {
            return Ok(login_page("Account locked out. Try again later."))
        }
    };

    let (ttl, max_age) = if form.remember() {
        let ttl = Duration::days(REMEMBERED_SESSION_DAYS);
        (ttl, Some(ttl))
    } else {
        (Duration::hours(SESSION_HOURS), None)
    };
    let token = issue_session_token(&state.config.jwt_secret, &user, ttl)?;
    let cookie = session_cookie(&token, max_age, state.config.session_cookie_secure);
    tracing::info!(user_id = %user.id, role = %user.role, "signed in");

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, "/".to_string()), (header::SET_COOKIE, cookie)],
    )
        .into_response())
}

pub async fn logout() -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, expired_session_cookie()),
        ],
    )
        .into_response()
}
