//! HTTP router and the non-resource handlers

use axum::{
    Extension, Json, Router, middleware,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use crate::auth::{AuthGate, ValidatedClaims, auth_gate};
use crate::profiles::profile_routes;
use crate::store::ProfileStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Profile collection
    pub store: ProfileStore,
    /// Bearer-token gate for protected routes
    pub gate: AuthGate,
    /// Global cap on in-flight requests; `None` leaves admission unbounded
    pub max_concurrent_requests: Option<usize>,
}

/// Create the router
///
/// `/health` is public. Everything else is registered behind the auth gate
/// with `route_layer`, so the gate only runs for requests that matched a
/// protected route and unknown paths still answer 404.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/weather", get(weather_handler))
        .merge(profile_routes(state.store))
        .route_layer(middleware::from_fn_with_state(state.gate, auth_gate));

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http());

    match state.max_concurrent_requests {
        Some(limit) => router.layer(GlobalConcurrencyLimitLayer::new(limit)),
        None => router,
    }
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /weather
async fn weather_handler(Extension(claims): Extension<ValidatedClaims>) -> impl IntoResponse {
    debug!(subject = %claims.subject, "Weather requested");
    Json(json!({
        "location": "San Francisco, CA",
        "temp": 72.5,
        "condition": "Sunny",
    }))
}
