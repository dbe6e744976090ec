//! API error handling
//!
//! Every error leaves the proxy as a short plain-text body. Clients on the
//! other side are media players and WebDAV mounts, not API consumers.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::proxy::UpstreamError;
use crate::store::StoreError;
use crate::transform::TransformError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Upstream URL is not configured (set ZURG_BASE_URL)")]
    UpstreamNotConfigured,

    #[error("Unauthorized")]
    Unauthorized { realm: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UpstreamNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, self.to_string()).into_response();

        if let ApiError::Unauthorized { realm } = &self {
            let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm))
                .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
            response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        }

        response
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::BodyTooLarge { .. } => ApiError::PayloadTooLarge,
            other => {
                tracing::error!(error = %other, "Upstream request failed");
                ApiError::Proxy(other.to_string())
            }
        }
    }
}

impl From<TransformError> for ApiError {
    fn from(err: TransformError) -> Self {
        tracing::error!(error = %err, "Failed to rewrite upstream response");
        ApiError::Proxy(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Config store failure");
        ApiError::Proxy(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::Unauthorized {
            realm: "Zurg RFC1123 Proxy".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"Zurg RFC1123 Proxy\""
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::UpstreamNotConfigured.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("nope".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UpstreamError::BodyTooLarge { limit: 1 }).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_proxy_error_message() {
        assert_eq!(
            ApiError::Proxy("connection refused".into()).to_string(),
            "Proxy error: connection refused"
        );
    }
}
