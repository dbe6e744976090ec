//! Pass-through handler for everything outside `/config`

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    response::Response,
};
use tracing::debug;

use crate::api::ApiError;
use crate::metrics;
use crate::transform::ResponseTransformer;
use crate::AppState;

/// Forward a request upstream and rewrite the response
pub async fn forward_request(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let upstream = state.upstream.as_ref().ok_or(ApiError::UpstreamNotConfigured)?;

    // One snapshot per request; a concurrent save applies to later requests
    let config = state.store.load().await?;

    let method = request.method().clone();
    debug!(method = %method, path = %request.uri().path(), "Incoming request");

    let started = Instant::now();
    let response = match upstream.forward(request, state.config.max_body_bytes).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_upstream_error();
            return Err(e.into());
        }
    };
    metrics::record_upstream_duration(method.as_str(), started.elapsed().as_secs_f64());

    let response = ResponseTransformer::new(&config, state.config.max_body_bytes)
        .transform(&method, response)
        .await?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::{MockConfigStore, StoreError};
    use axum::{body::Body, http::StatusCode, response::IntoResponse};

    fn state_with(store: MockConfigStore) -> Arc<AppState> {
        let config = AppConfig {
            upstream_url: Some("http://127.0.0.1:9".into()),
            ..AppConfig::default()
        };
        Arc::new(AppState::with_store(config, Arc::new(store)).unwrap())
    }

    #[tokio::test]
    async fn test_store_failure_is_a_proxy_error() {
        let mut store = MockConfigStore::new();
        store.expect_load().times(1).returning(|| {
            Err(StoreError::Corrupt {
                path: "proxy-config.json".into(),
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            })
        });
        store.expect_save().never();

        let request = Request::builder().uri("/dav/").body(Body::empty()).unwrap();
        let err = forward_request(State(state_with(store)), request)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Proxy(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
