use axum::http::StatusCode;

mod common;

use common::{
    admin_token, create_test_app, enroll, send, token_for, COURSE_ID, LEARNER, LESSONS,
    OTHER_LEARNER,
};

fn complete_uri(enrollment_id: &str, lesson_id: &str) -> String {
    format!(
        "/api/v1/enrollments/{}/lessons/{}/complete",
        enrollment_id, lesson_id
    )
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/courses/{}/enroll", COURSE_ID),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/courses/{}/enroll", COURSE_ID),
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_enroll_is_idempotent() {
    let app = create_test_app().await;

    let first = enroll(&app, LEARNER).await;
    let second = enroll(&app, LEARNER).await;
    assert_eq!(first, second);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/courses/unknown-course/enroll",
        Some(&token_for(LEARNER)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_lesson_completion_flow() {
    let app = create_test_app().await;
    let token = token_for(LEARNER);
    let enrollment_id = enroll(&app, LEARNER).await;

    let (status, body) = send(
        &app,
        "POST",
        &complete_uri(&enrollment_id, LESSONS[0]),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_completed"], true);
    assert_eq!(body["enrollment"]["status"], "in_progress");
    assert_eq!(body["enrollment"]["completion_percentage"], 25);
    assert!(body["enrollment"]["started_at"].is_string());

    // Replaying the same lesson changes nothing
    let (status, body) = send(
        &app,
        "POST",
        &complete_uri(&enrollment_id, LESSONS[0]),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_completed"], false);
    assert_eq!(body["enrollment"]["completed_lessons"], 1);

    for lesson in &LESSONS[1..] {
        let (status, _) = send(
            &app,
            "POST",
            &complete_uri(&enrollment_id, lesson),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/courses/{}/progress", COURSE_ID),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrollment"]["status"], "completed");
    assert_eq!(body["enrollment"]["completion_percentage"], 100);
    assert!(body["enrollment"]["completed_at"].is_string());
    assert_eq!(body["lessons"].as_array().unwrap().len(), LESSONS.len());
}

#[tokio::test]
async fn test_cannot_complete_on_someone_elses_enrollment() {
    let app = create_test_app().await;
    let enrollment_id = enroll(&app, LEARNER).await;

    let (status, body) = send(
        &app,
        "POST",
        &complete_uri(&enrollment_id, LESSONS[0]),
        Some(&token_for(OTHER_LEARNER)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
}

#[tokio::test]
async fn test_unknown_lesson_is_not_found() {
    let app = create_test_app().await;
    let enrollment_id = enroll(&app, LEARNER).await;

    let (status, _) = send(
        &app,
        "POST",
        &complete_uri(&enrollment_id, "no-such-lesson"),
        Some(&token_for(LEARNER)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_progress_without_enrollment_is_empty() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/courses/{}/progress", COURSE_ID),
        Some(&token_for(LEARNER)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["enrollment"].is_null());
    assert!(body["lessons"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_recompute() {
    let app = create_test_app().await;
    let enrollment_id = enroll(&app, LEARNER).await;
    send(
        &app,
        "POST",
        &complete_uri(&enrollment_id, LESSONS[1]),
        Some(&token_for(LEARNER)),
        None,
    )
    .await;

    let uri = format!("/admin/enrollments/{}/recompute", enrollment_id);

    let (status, _) = send(&app, "POST", &uri, Some(&token_for(LEARNER)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_lessons"], 1);
    assert_eq!(body["total_lessons"], 4);

    let (status, _) = send(
        &app,
        "POST",
        "/admin/enrollments/missing/recompute",
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
