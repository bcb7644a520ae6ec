use axum::{
    extract::{Extension, State},
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::middlewares::auth::JwtClaims;
use crate::models::gamification::GamificationProfile;
use crate::services::AppState;
use crate::store::LearningStore;

/// GET /api/v1/me/gamification
pub async fn get_my_profile<S: LearningStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<GamificationProfile>, ApiError> {
    let profile = state.points_engine().get_profile(&claims.sub).await?;
    Ok(Json(profile))
}
