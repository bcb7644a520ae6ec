#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower::ServiceExt;

use coursequest_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService, ADMIN_ROLE},
    models::{
        course::{Course, Lesson},
        gamification::UserPoints,
        quiz::{Quiz, QuizOption, QuizQuestion, RewardSchedule},
    },
    services::AppState,
    store::MemoryStore,
};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const LEARNER: &str = "learner-1";
pub const OTHER_LEARNER: &str = "learner-2";
pub const ADMIN: &str = "admin-1";
pub const COURSE_ID: &str = "rust-101";
pub const QUIZ_ID: &str = "rust-101-quiz";
pub const LESSONS: [&str; 4] = ["ownership", "borrowing", "lifetimes", "traits"];

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
}

pub async fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = MemoryStore::new();
    seed_test_data(&store).await;

    let app_state = Arc::new(AppState::new(
        Config::for_memory_store(JWT_SECRET),
        store.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        store,
    }
}

async fn seed_test_data(store: &MemoryStore) {
    store
        .insert_course(Course {
            id: COURSE_ID.to_string(),
            title: "Rust 101".to_string(),
        })
        .await;
    for (index, lesson_id) in LESSONS.iter().enumerate() {
        store
            .insert_lesson(Lesson {
                id: lesson_id.to_string(),
                course_id: COURSE_ID.to_string(),
                title: lesson_id.to_uppercase(),
                position: index as u32 + 1,
            })
            .await;
    }

    for user in [LEARNER, OTHER_LEARNER, ADMIN] {
        store.insert_user(UserPoints::new(user)).await;
    }

    // Two questions: q1 -> {a}, q2 -> {b, c}
    let question = |id: &str, correct: &[&str]| QuizQuestion {
        id: id.to_string(),
        prompt: format!("Question {}", id),
        options: ["a", "b", "c"]
            .iter()
            .map(|option| QuizOption {
                id: option.to_string(),
                text: option.to_uppercase(),
            })
            .collect(),
        correct_option_ids: correct.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    };
    store
        .insert_quiz(Quiz {
            id: QUIZ_ID.to_string(),
            course_id: COURSE_ID.to_string(),
            title: "Ownership check".to_string(),
            questions: vec![question("q1", &["a"]), question("q2", &["b", "c"])],
            reward_schedule: RewardSchedule {
                first: 10,
                second: 7,
                third: 5,
                fourth_plus: 2,
            },
        })
        .await;
}

pub fn token_for(user_id: &str) -> String {
    sign(JwtClaims::new(user_id, "learner", 3600))
}

pub fn admin_token() -> String {
    sign(JwtClaims::new(ADMIN, ADMIN_ROLE, 3600))
}

fn sign(claims: JwtClaims) -> String {
    JwtService::new(JWT_SECRET)
        .generate_token(&claims)
        .expect("Failed to sign test token")
}

/// Sends a request and returns the status with the parsed JSON body
/// (`Value::Null` for empty or non-JSON bodies).
pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}

/// Enrolls `user_id` in the seeded course and returns the enrollment id
pub async fn enroll(app: &TestApp, user_id: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        &format!("/api/v1/courses/{}/enroll", COURSE_ID),
        Some(&token_for(user_id)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "enroll failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}
