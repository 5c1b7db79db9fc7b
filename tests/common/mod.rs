#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use exam_lockdown::{
    config::{Config, LockdownPolicy},
    database::MemoryStore,
    models::{
        exam::{ExamCode, ExamKind},
        user::User,
    },
    routes,
    utils::password::hash_password,
    AppState,
};
use serde_json::Value as JsonValue;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEACHER_PASSWORD: &str = "teacher-secret";
pub const STUDENT_PASSWORD: &str = "student-secret";
pub const STUDENT_EMAIL: &str = "student@example.com";

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        database_url: String::new(),
        jwt_secret: "test_secret_key".to_string(),
        authorize_attempts_per_minute: 100,
        session_cookie_secure: false,
        policy: LockdownPolicy::default(),
    }
}

pub fn user(role: &str, email: &str, password: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: format!("{} user", role),
        role: role.to_string(),
        password_hash: hash_password(password).expect("hash password"),
        failed_login_count: 0,
        lockout_end: None,
    }
}

pub fn exam_code(kind: ExamKind, code: &str, teacher_id: Uuid, duration_minutes: i32) -> ExamCode {
    ExamCode {
        id: Uuid::new_v4(),
        kind,
        exam_id: Uuid::new_v4(),
        code: code.to_string(),
        is_active: true,
        expires_at: None,
        max_uses: None,
        use_count: 0,
        exam_title: "Midterm".to_string(),
        course_name: "Algorithms".to_string(),
        duration_minutes,
        teacher_id,
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub state: AppState,
    pub app: Router,
    pub teacher: User,
    pub student: User,
    pub standard_code: ExamCode,
    pub programming_code: ExamCode,
}

/// A store seeded with one teacher, one student, a standard code `ABC123`
/// and a programming code `PRG456`.
pub async fn spawn_app_with(config: Config) -> TestApp {
    let store = MemoryStore::new();
    let teacher = user("teacher", "teacher@example.com", TEACHER_PASSWORD);
    let student = user("student", STUDENT_EMAIL, STUDENT_PASSWORD);
    store.insert_user(teacher.clone()).await;
    store.insert_user(student.clone()).await;

    let standard_code = exam_code(ExamKind::Standard, "ABC123", teacher.id, 120);
    let programming_code = exam_code(ExamKind::Programming, "PRG456", teacher.id, 90);
    store.insert_exam_code(standard_code.clone()).await;
    store.insert_exam_code(programming_code.clone()).await;

    let state = AppState::new(Arc::new(store.clone()), config);
    let app = routes::router(state.clone());
    TestApp {
        store,
        state,
        app,
        teacher,
        student,
        standard_code,
        programming_code,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn post_login(app: &Router, form: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/Account/ProcessLogin")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Signs in and returns the `name=value` pair to send back as a cookie.
pub async fn login_cookie(app: &Router, email: &str, password: &str) -> String {
    let res = post_login(app, &format!("email={}&password={}", email, password)).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let res = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

pub fn launch_query(attempt_id: &str, launch_token: &str, programming: bool) -> String {
    format!(
        "attemptId={}&launchToken={}&programming={}",
        attempt_id, launch_token, programming
    )
}

pub fn minutes_after(t: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    t + chrono::Duration::minutes(minutes)
}
