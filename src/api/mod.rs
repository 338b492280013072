pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

pub use handlers::AppState;

use handlers::ApiDoc;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/readings", post(handlers::post_reading))
        .route("/sites", get(handlers::get_sites))
        .route(
            "/sites/{site_id}/readings/latest",
            get(handlers::get_latest_readings),
        )
        .route(
            "/sites/{site_id}/readings",
            get(handlers::get_reading_history),
        )
        .route("/sites/{site_id}/stats", get(handlers::get_stats))
        .route("/sites/{site_id}/alerts", get(handlers::get_alerts))
        .route(
            "/sites/{site_id}/actuators",
            get(handlers::get_actuator_status),
        )
        .route(
            "/sites/{site_id}/actuators/history",
            get(handlers::get_actuator_history),
        )
        .route(
            "/sites/{site_id}/actuators/control",
            post(handlers::post_control),
        )
        .route(
            "/sites/{site_id}/actuators/manual",
            post(handlers::post_manual),
        )
        .route(
            "/sites/{site_id}/thresholds",
            get(handlers::get_thresholds).put(handlers::put_thresholds),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
