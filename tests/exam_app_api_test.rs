mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::{launch_query, login_cookie, post_login, send, spawn_app, spawn_app_with, test_config};
use exam_lockdown::models::attempt::AttemptStatus;
use exam_lockdown::models::exam::{AttemptRef, ExamKind};

#[tokio::test]
async fn exam_app_flow_end_to_end() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let (status, body) = send(&t.app, Method::GET, "/api/exam-app/code/abc123", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["exam"]["examTitle"], "Midterm");
    assert_eq!(body["exam"]["durationMinutes"], 120);
    assert_eq!(body["exam"]["isProgrammingExam"], false);
    assert_eq!(body["exam"]["teacherName"], "teacher user");

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/authorize",
        Some(&cookie),
        Some(json!({"code": "ABC123", "teacherPassword": common::TEACHER_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let authorization_token = body["authorizationToken"].as_str().unwrap().to_string();
    assert_eq!(authorization_token.len(), 43);

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/start",
        Some(&cookie),
        Some(json!({"authorizationToken": authorization_token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isProgrammingExam"], false);
    let attempt_id = body["attemptId"].as_str().unwrap().to_string();
    let launch_token = body["launchToken"].as_str().unwrap().to_string();
    assert_ne!(launch_token, authorization_token);

    let query = launch_query(&attempt_id, &launch_token, false);
    let (status, body) = send(
        &t.app,
        Method::GET,
        &format!("/api/exam-app/session?{}", query),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["status"], "in_progress");
    let remaining = body["remainingSeconds"].as_i64().unwrap();
    assert!(remaining > 119 * 60 && remaining <= 120 * 60);

    let (status, body) = send(
        &t.app,
        Method::POST,
        &format!("/api/exam-app/violations?{}", query),
        Some(&cookie),
        Some(json!({"kind": "focus_lost", "detail": "Another window took focus"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["violationCount"], 1);

    let submit = json!({"attemptId": attempt_id});
    let (status, body) = send(&t.app, Method::POST, "/api/exam-app/submit", Some(&cookie), Some(submit.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Repeating submit is harmless.
    let (status, body) = send(&t.app, Method::POST, "/api/exam-app/submit", Some(&cookie), Some(submit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sessions = t
        .store
        .sessions_for(
            AttemptRef::new(ExamKind::Standard, attempt_id.parse().unwrap()),
            t.student.id,
        )
        .await;
    assert_eq!(sessions.len(), 1);

    // A completed attempt no longer passes the launch gate.
    let (status, body) = send(
        &t.app,
        Method::GET,
        &format!("/api/exam-app/session?{}", query),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization is invalid or has expired.");
}

#[tokio::test]
async fn login_redirects_with_cookie_only_on_success() {
    let t = spawn_app().await;

    let res = post_login(&t.app, &format!("email={}&password=wrong", common::STUDENT_EMAIL)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());

    let res = post_login(
        &t.app,
        &format!(
            "email={}&password={}&rememberMe=true",
            common::STUDENT_EMAIL,
            common::STUDENT_PASSWORD
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[header::LOCATION], "/");
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("exam_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=2592000"));

    let res = post_login(
        &t.app,
        &format!("email={}&password={}", common::STUDENT_EMAIL, common::STUDENT_PASSWORD),
    )
    .await;
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(!cookie.contains("Max-Age"));
}

#[tokio::test]
async fn exam_app_requires_a_session() {
    let t = spawn_app().await;

    let (status, body) = send(&t.app, Method::GET, "/api/exam-app/code/ABC123", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_session");

    let (status, body) = send(
        &t.app,
        Method::GET,
        "/api/exam-app/code/ABC123",
        Some("exam_session=not.a.jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_session");

    let (status, _) = send(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn authorize_failures_share_one_generic_error() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    for body in [
        json!({"code": "ABC123", "teacherPassword": "nope"}),
        json!({"code": "NOSUCH", "teacherPassword": common::TEACHER_PASSWORD}),
    ] {
        let (status, body) = send(&t.app, Method::POST, "/api/exam-app/authorize", Some(&cookie), Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Authorization failed.");
    }

    let (status, _) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/authorize",
        Some(&cookie),
        Some(json!({"code": "ABC123", "teacherPassword": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.store.authorizations().await.is_empty());
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let (status, body) = send(&t.app, Method::GET, "/api/exam-app/code/ZZZ999", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Exam code is invalid or has expired.");
}

#[tokio::test]
async fn authorize_is_rate_limited_per_student() {
    let mut config = test_config();
    config.authorize_attempts_per_minute = 2;
    let t = spawn_app_with(config).await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let wrong = json!({"code": "ABC123", "teacherPassword": "guess"});
    for _ in 0..2 {
        let (status, _) = send(&t.app, Method::POST, "/api/exam-app/authorize", Some(&cookie), Some(wrong.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&t.app, Method::POST, "/api/exam-app/authorize", Some(&cookie), Some(wrong)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn authorization_token_starts_only_once() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let (_, body) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/authorize",
        Some(&cookie),
        Some(json!({"code": "PRG456", "teacherPassword": common::TEACHER_PASSWORD})),
    )
    .await;
    let start = json!({"authorizationToken": body["authorizationToken"]});

    let (status, body) = send(&t.app, Method::POST, "/api/exam-app/start", Some(&cookie), Some(start.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isProgrammingExam"], true);

    let (status, body) = send(&t.app, Method::POST, "/api/exam-app/start", Some(&cookie), Some(start)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization is invalid or has expired.");
}

#[tokio::test]
async fn proctored_routes_reject_bad_launch_credentials() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let (_, body) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/authorize",
        Some(&cookie),
        Some(json!({"code": "ABC123", "teacherPassword": common::TEACHER_PASSWORD})),
    )
    .await;
    let (_, body) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/start",
        Some(&cookie),
        Some(json!({"authorizationToken": body["authorizationToken"]})),
    )
    .await;
    let attempt_id = body["attemptId"].as_str().unwrap().to_string();
    let launch_token = body["launchToken"].as_str().unwrap().to_string();

    let bad_queries = [
        String::new(),
        launch_query(&attempt_id, "forged", false),
        // right token, wrong exam kind
        launch_query(&attempt_id, &launch_token, true),
        launch_query(&uuid::Uuid::new_v4().to_string(), &launch_token, false),
    ];
    for query in bad_queries {
        let (status, body) = send(
            &t.app,
            Method::GET,
            &format!("/api/exam-app/session?{}", query),
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "query {:?}", query);
        assert_eq!(body["error"], "Authorization is invalid or has expired.");
    }

    let attempt = t
        .state
        .attempt_service
        .find(AttemptRef::new(ExamKind::Standard, attempt_id.parse().unwrap()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::InProgress);
}

#[tokio::test]
async fn submit_of_unknown_attempt_is_not_found() {
    let t = spawn_app().await;
    let cookie = login_cookie(&t.app, common::STUDENT_EMAIL, common::STUDENT_PASSWORD).await;

    let (status, _) = send(
        &t.app,
        Method::POST,
        "/api/exam-app/submit",
        Some(&cookie),
        Some(json!({"attemptId": uuid::Uuid::new_v4()})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
