//! Runs against a real Postgres when `DATABASE_URL` is set; skipped otherwise.

use std::env;
use std::sync::Arc;

use chrono::{Duration, Utc};
use exam_lockdown::{
    config::LockdownPolicy,
    database::{pool::run_migrations, LockdownStore, PgStore, SharedStore},
    models::exam::{ExamCodeRef, ExamKind},
    services::{
        attempt_service::AttemptService,
        authorization_service::{AuthorizationService, AuthorizeOutcome},
        identity_service::IdentityService,
        launch_session_service::{LaunchSessionService, StartOutcome},
    },
    utils::password::hash_password,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[tokio::test]
async fn postgres_store_runs_the_launch_flow() {
    dotenvy::dotenv().ok();
    let Ok(database_url) = env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let teacher_id = Uuid::new_v4();
    let student_id = Uuid::new_v4();
    for (id, role, password) in [(teacher_id, "teacher", "teach-pw"), (student_id, "student", "stud-pw")] {
        sqlx::query(
            "INSERT INTO users (id, email, name, role, password_hash) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(format!("{}_{}@example.com", role, id))
        .bind(format!("{} {}", role, id))
        .bind(role)
        .bind(hash_password(password).unwrap())
        .execute(&pool)
        .await
        .expect("seed user");
    }

    let exam_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO programming_exams (id, title, course_name, duration_minutes, teacher_id) \
         VALUES ($1, 'Graphs', 'Algorithms', 45, $2)",
    )
    .bind(exam_id)
    .bind(teacher_id)
    .execute(&pool)
    .await
    .expect("seed exam");

    let code_id = Uuid::new_v4();
    let code = format!("P{}", &code_id.simple().to_string()[..7]).to_uppercase();
    sqlx::query(
        "INSERT INTO programming_exam_codes (id, programming_exam_id, code) VALUES ($1, $2, $3)",
    )
    .bind(code_id)
    .bind(exam_id)
    .bind(&code)
    .execute(&pool)
    .await
    .expect("seed code");

    let store: SharedStore = Arc::new(PgStore::new(pool.clone()));
    let policy = LockdownPolicy::default();
    let identity = IdentityService::new(store.clone(), policy.clone());
    let authorization = AuthorizationService::new(store.clone(), identity, policy.clone());
    let attempts = AttemptService::new(store.clone());
    let sessions = LaunchSessionService::new(store.clone(), attempts.clone(), policy);

    let now = Utc::now();
    let AuthorizeOutcome::Authorized { token, .. } = authorization
        .authorize(student_id, &code, "teach-pw", now)
        .await
        .unwrap()
    else {
        panic!("authorization refused");
    };

    let StartOutcome::Started {
        attempt_id,
        kind,
        launch_token,
        expires_at,
    } = sessions.start(student_id, &token, now).await.unwrap()
    else {
        panic!("start refused");
    };
    assert_eq!(kind, ExamKind::Programming);
    assert_eq!(
        expires_at.timestamp(),
        (now + Duration::minutes(55)).timestamp()
    );
    assert_eq!(
        sessions.start(student_id, &token, now).await.unwrap(),
        StartOutcome::InvalidOrExpiredAuthorization
    );

    assert!(sessions
        .validate_launch_token(attempt_id, student_id, &launch_token, true, now)
        .await
        .unwrap());
    assert!(!sessions
        .validate_launch_token(attempt_id, student_id, &launch_token, false, now)
        .await
        .unwrap());

    let used = store
        .find_exam_code_by_ref(ExamCodeRef {
            kind: ExamKind::Programming,
            id: code_id,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(used.use_count, 1);

    attempts.submit(student_id, attempt_id, now).await.unwrap();
    assert!(!sessions
        .validate_launch_token(attempt_id, student_id, &launch_token, true, now)
        .await
        .unwrap());
}
