//! API module for zurg-edge
//!
//! Provides:
//! - `/config` for reading and editing rewrite rules
//! - everything else forwarded to the upstream WebDAV server
//!
//! Every route sits behind the upstream-configured check and basic auth,
//! in that order. Responses are counted outside both.

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};

use crate::AppState;

pub use auth::is_valid_auth;
pub use error::ApiError;
pub use handlers::config::{parse_config_form, render_config_page, validate_config};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let config_routes = get(handlers::config::show_config)
        .post(handlers::config::save_config_form)
        .put(handlers::config::save_config_json);

    Router::new()
        .route("/config", config_routes.clone())
        .route("/config/", config_routes)
        .fallback(handlers::proxy::forward_request)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_basic_auth))
        .layer(middleware::from_fn_with_state(state.clone(), require_upstream))
        .layer(middleware::from_fn(count_requests))
        .with_state(state)
}

/// Count every response by method and final status, rejections included
async fn count_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    crate::metrics::record_request(method.as_str(), response.status().as_u16());
    response
}

/// Fail every request while no upstream is configured
async fn require_upstream(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.upstream.is_none() {
        return Err(ApiError::UpstreamNotConfigured);
    }
    Ok(next.run(request).await)
}
