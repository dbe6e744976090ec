//! Basic auth in front of the proxy

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::AppState;

use super::ApiError;

/// Check a `Basic` authorization header against the expected credentials
pub fn is_valid_auth(auth_header: &str, username: &str, password: &str) -> bool {
    let Some(encoded) = auth_header.strip_prefix("Basic ") else {
        return false;
    };

    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };

    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };

    match decoded.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}

/// Reject requests without valid credentials; a no-op when auth is not configured
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some((username, password)) = state.config.auth.credentials() else {
        return Ok(next.run(request).await);
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| is_valid_auth(h, username, password));

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected request without valid credentials");
        return Err(ApiError::Unauthorized {
            realm: state.config.auth.realm.clone(),
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[test]
    fn test_valid_credentials() {
        assert!(is_valid_auth(&basic("infuse:secret"), "infuse", "secret"));
    }

    #[test]
    fn test_password_may_contain_colon() {
        assert!(is_valid_auth(&basic("infuse:se:cret"), "infuse", "se:cret"));
    }

    #[test]
    fn test_rejects_bad_credentials() {
        assert!(!is_valid_auth(&basic("infuse:wrong"), "infuse", "secret"));
        assert!(!is_valid_auth(&basic("other:secret"), "infuse", "secret"));
        assert!(!is_valid_auth(&basic("nocolon"), "infuse", "secret"));
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(!is_valid_auth("Bearer abc", "infuse", "secret"));
        assert!(!is_valid_auth("Basic !!!not-base64", "infuse", "secret"));
        assert!(!is_valid_auth("", "infuse", "secret"));
    }
}
