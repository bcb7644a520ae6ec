use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::quiz::{QuizAttempt, SubmitQuizRequest};
use crate::services::AppState;
use crate::store::LearningStore;

/// POST /api/v1/quizzes/{quiz_id}/attempts
pub async fn submit_attempt<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let result = state
        .quiz_engine()
        .submit_quiz_attempt(&quiz_id, &req.enrollment_id, &claims.sub, &req.answers)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/v1/quizzes/{quiz_id}/attempts
pub async fn list_attempts<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<Json<Vec<QuizAttempt>>, ApiError> {
    let attempts = state
        .quiz_engine()
        .list_attempts(&claims.sub, &quiz_id)
        .await?;

    Ok(Json(attempts))
}
