//! API route definitions

use super::handlers::{self, ApiState};
use crate::auth::middleware::require_auth;
use axum::{
    http::{request::Parts, HeaderValue},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use regex::Regex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    let protected = Router::new()
        .route(
            "/api/{resource}",
            get(handlers::list_resources).post(handlers::create_resource),
        )
        .route(
            "/api/{resource}/{id}",
            get(handlers::get_resource)
                .patch(handlers::update_resource)
                .put(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS layer from origin regexes. No patterns allows any origin; invalid
/// patterns are skipped.
pub fn cors_layer(patterns: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if patterns.is_empty() {
        return cors.allow_origin(Any);
    }

    let compiled: Vec<Regex> = patterns
        .iter()
        .filter_map(|pattern| match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| compiled.iter().any(|re| re.is_match(origin)))
                .unwrap_or(false)
        },
    ))
}
