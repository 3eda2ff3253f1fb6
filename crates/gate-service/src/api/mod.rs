pub mod routes;

use crate::state::GateServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: GateServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Session endpoints
        .route(
            "/v1/sessions",
            get(routes::list_sessions).post(routes::start_session),
        )
        .route(
            "/v1/sessions/:id",
            get(routes::get_session).delete(routes::end_session),
        )
        .route("/v1/sessions/:id/frames", post(routes::submit_frame))
        // Registration endpoints
        .route(
            "/v1/vehicles",
            get(routes::list_vehicles).post(routes::register_vehicle),
        )
        .route("/v1/vehicles/:plate", axum::routing::delete(routes::remove_vehicle))
        .route(
            "/v1/identities",
            get(routes::list_identities).post(routes::register_identity),
        )
        .route(
            "/v1/identities/:id/access-count",
            get(routes::identity_access_count),
        )
        // Audit trail
        .route("/v1/history", get(routes::attempt_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
