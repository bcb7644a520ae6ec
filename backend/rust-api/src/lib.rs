use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use services::AppState;
use store::LearningStore;

pub fn create_router<S: LearningStore>(app_state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check::<S>))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest(
            "/api/v1",
            learner_routes::<S>()
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware::<S>,
                ))
                .layer(cors),
        )
        .nest(
            "/admin",
            admin_routes::<S>()
                .route_layer(middleware::from_fn(
                    middlewares::auth::admin_guard_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware::<S>,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn learner_routes<S: LearningStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/courses/{course_id}/enroll", post(handlers::progress::enroll::<S>))
        .route(
            "/courses/{course_id}/progress",
            get(handlers::progress::get_course_progress::<S>),
        )
        .route(
            "/enrollments/{enrollment_id}/lessons/{lesson_id}/complete",
            post(handlers::progress::complete_lesson::<S>),
        )
        .route(
            "/quizzes/{quiz_id}/attempts",
            get(handlers::quizzes::list_attempts::<S>)
                .post(handlers::quizzes::submit_attempt::<S>),
        )
        .route(
            "/me/gamification",
            get(handlers::gamification::get_my_profile::<S>),
        )
}

fn admin_routes<S: LearningStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/enrollments/{enrollment_id}/recompute",
            post(handlers::admin::recompute_enrollment::<S>),
        )
        .route(
            "/users/{user_id}/points",
            post(handlers::admin::award_points::<S>),
        )
}
