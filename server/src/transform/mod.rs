//! Response rewriting
//!
//! Two independent checks run on every proxied response:
//!
//! - PROPFIND multi-status XML gets its body rewritten: timestamps first
//!   (when enabled), then the filename rules.
//! - A `Location` header gets the location rules.
//!
//! Anything that does not qualify is returned as received, body stream
//! untouched.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
};
use thiserror::Error;
use tracing::debug;

use crate::metrics;
use crate::models::{ProxyConfig, RewriteRule};
use crate::rewrite::{RuleEngine, RuleError};

/// Errors raised while rewriting a response
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("failed to read upstream body: {0}")]
    Body(String),

    #[error("rewritten Location header is not a valid header value: {0}")]
    InvalidLocation(String),
}

/// Whether a response is a WebDAV multi-status listing to rewrite
pub fn is_multistatus_xml(method: &Method, status: StatusCode, headers: &HeaderMap) -> bool {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    method.as_str() == "PROPFIND" && status == StatusCode::MULTI_STATUS && content_type.contains("xml")
}

/// Compile the rules for a multi-status body: the timestamp fix when
/// enabled, then the filename rules in order
pub fn body_rules(config: &ProxyConfig) -> Result<RuleEngine, RuleError> {
    let mut engine = if config.fix_timestamps {
        RuleEngine::with_timestamp_fix()
    } else {
        RuleEngine::new()
    };
    engine.extend(&config.filename_rules)?;
    Ok(engine)
}

/// Rewrite a multi-status XML document
pub fn rewrite_multistatus(xml: &str, config: &ProxyConfig) -> Result<String, RuleError> {
    Ok(body_rules(config)?.apply(xml))
}

/// Rewrite a `Location` value; `None` when the rules leave it unchanged
pub fn rewrite_location(location: &str, rules: &[RewriteRule]) -> Result<Option<String>, RuleError> {
    if rules.is_empty() {
        return Ok(None);
    }
    let rewritten = crate::rewrite::apply(location, rules)?;
    Ok((rewritten != location).then_some(rewritten))
}

/// Applies one config snapshot to proxied responses
pub struct ResponseTransformer<'a> {
    config: &'a ProxyConfig,
    max_body_bytes: usize,
}

impl<'a> ResponseTransformer<'a> {
    pub fn new(config: &'a ProxyConfig, max_body_bytes: usize) -> Self {
        Self {
            config,
            max_body_bytes,
        }
    }

    /// Run both rewrite paths over a response
    pub async fn transform(&self, method: &Method, response: Response) -> Result<Response, TransformError> {
        let response = if is_multistatus_xml(method, response.status(), response.headers()) {
            self.rewrite_body(response).await?
        } else {
            response
        };

        self.rewrite_location_header(response)
    }

    async fn rewrite_body(&self, response: Response) -> Result<Response, TransformError> {
        let engine = body_rules(self.config)?;
        if engine.is_empty() {
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| TransformError::Body(e.to_string()))?;

        let xml = String::from_utf8_lossy(&bytes);
        let rewritten = engine.apply(&xml);
        if rewritten == xml {
            debug!(bytes = bytes.len(), "Multi-status body unchanged by rewrite rules");
            return Ok(Response::from_parts(parts, Body::from(bytes)));
        }

        debug!(
            original_bytes = bytes.len(),
            rewritten_bytes = rewritten.len(),
            rules = engine.len(),
            "Rewrote multi-status body"
        );
        metrics::record_body_rewrite();

        // The length changed; the server frames the new body itself
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Body::from(rewritten)))
    }

    fn rewrite_location_header(&self, response: Response) -> Result<Response, TransformError> {
        let Some(location) = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(response);
        };

        let Some(rewritten) = rewrite_location(location, &self.config.location_rules)? else {
            return Ok(response);
        };

        let value = HeaderValue::from_str(&rewritten)
            .map_err(|_| TransformError::InvalidLocation(rewritten.clone()))?;
        debug!(from = %location, to = %rewritten, "Rewrote Location header");
        metrics::record_location_rewrite();

        let (mut parts, body) = response.into_parts();
        parts.headers.insert(header::LOCATION, value);
        Ok(Response::from_parts(parts, body))
    }
}
