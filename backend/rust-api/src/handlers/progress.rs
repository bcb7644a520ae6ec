use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::middlewares::auth::JwtClaims;
use crate::models::enrollment::LessonCompletion;
use crate::services::progress_service::CourseProgress;
use crate::services::AppState;
use crate::store::LearningStore;

/// POST /api/v1/courses/{course_id}/enroll
pub async fn enroll<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state
        .enrollment_aggregator()
        .enroll(&claims.sub, &course_id)
        .await?;

    Ok((StatusCode::OK, Json(enrollment)))
}

/// GET /api/v1/courses/{course_id}/progress
pub async fn get_course_progress<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseProgress>, ApiError> {
    let progress = state
        .progress_ledger()
        .get_course_progress(&claims.sub, &course_id)
        .await?;

    Ok(Json(progress))
}

/// POST /api/v1/enrollments/{enrollment_id}/lessons/{lesson_id}/complete
pub async fn complete_lesson<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path((enrollment_id, lesson_id)): Path<(String, String)>,
) -> Result<Json<LessonCompletion>, ApiError> {
    tracing::info!(
        "Completing lesson {} on enrollment {} for user {}",
        lesson_id,
        enrollment_id,
        claims.sub
    );

    let completion = state
        .progress_ledger()
        .mark_lesson_complete(&claims.sub, &lesson_id, &enrollment_id)
        .await?;

    Ok(Json(completion))
}
