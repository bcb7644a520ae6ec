use axum::{
    extract::{Extension, Path, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::enrollment::Enrollment;
use crate::models::gamification::{AwardPointsRequest, PointsAward};
use crate::services::AppState;
use crate::store::LearningStore;

/// POST /admin/enrollments/{enrollment_id}/recompute
pub async fn recompute_enrollment<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(enrollment_id): Path<String>,
) -> Result<Json<Enrollment>, ApiError> {
    tracing::info!(
        "Admin {} requested recompute of enrollment {}",
        claims.sub,
        enrollment_id
    );

    let enrollment = state
        .enrollment_aggregator()
        .recompute_enrollment(&enrollment_id)
        .await?;

    Ok(Json(enrollment))
}

/// POST /admin/users/{user_id}/points - manual award (support, promotions)
pub async fn award_points<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<AwardPointsRequest>,
) -> Result<Json<PointsAward>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!(
        "Admin {} awarding {} points to {}",
        claims.sub,
        req.amount,
        user_id
    );

    let award = state
        .points_engine()
        .award_points(&user_id, req.amount)
        .await?;

    Ok(Json(award))
}
