//! Upstream forwarding
//!
//! Requests are forwarded verbatim to the configured base URL: same method,
//! path, query, headers and body, with only `Host` replaced. Redirects are
//! not followed so `Location` headers reach the response transformer.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::Response,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Headers that only describe a single connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream forwarding errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream URL has no host: {0}")]
    MissingHost(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

/// Client for the Zurg WebDAV server
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
    host: HeaderValue,
}

impl Upstream {
    pub fn new(base_url: &str) -> Result<Self, UpstreamError> {
        let base = Url::parse(base_url).map_err(|source| UpstreamError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let authority = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(UpstreamError::MissingHost(base_url.to_string())),
        };
        let host = HeaderValue::from_str(&authority)
            .map_err(|_| UpstreamError::MissingHost(base_url.to_string()))?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self { client, base, host })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The base URL with path and query taken from the incoming request
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut target = self.base.clone();
        target.set_path(uri.path());
        target.set_query(uri.query());
        target
    }

    /// Forward a request and return the upstream response with its body
    /// still streaming.
    pub async fn forward(&self, request: Request, max_body_bytes: usize) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();

        let declared_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_length.is_some_and(|len| len > max_body_bytes) {
            return Err(UpstreamError::BodyTooLarge { limit: max_body_bytes });
        }

        let body = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|_| UpstreamError::BodyTooLarge { limit: max_body_bytes })?;

        let target = self.target_url(&parts.uri);
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        if parts.method.as_str() == "PROPFIND" {
            // Multi-status bodies are rewritten as text, so ask for them uncompressed
            headers.remove(header::ACCEPT_ENCODING);
        }
        headers.insert(header::HOST, self.host.clone());

        debug!(method = %parts.method, url = %target, body_bytes = body.len(), "Sending upstream request");

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        Ok(into_response(upstream))
    }
}

/// Convert an upstream reply into a streaming response
fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Remove connection-scoped headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url_replaces_path_and_query() {
        let upstream = Upstream::new("http://zurg:9999/ignored?x=1").unwrap();
        let uri: Uri = "/dav/movies/A%20B.mkv?depth=1".parse().unwrap();
        assert_eq!(
            upstream.target_url(&uri).as_str(),
            "http://zurg:9999/dav/movies/A%20B.mkv?depth=1"
        );

        let uri: Uri = "/dav/".parse().unwrap();
        assert_eq!(upstream.target_url(&uri).as_str(), "http://zurg:9999/dav/");
    }

    #[test]
    fn test_host_header_includes_port() {
        let upstream = Upstream::new("http://zurg:9999").unwrap();
        assert_eq!(upstream.host, "zurg:9999");

        let upstream = Upstream::new("https://media.example").unwrap();
        assert_eq!(upstream.host, "media.example");
    }

    #[test]
    fn test_invalid_upstream() {
        assert!(matches!(
            Upstream::new("not a url"),
            Err(UpstreamError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("depth", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("depth").unwrap(), "1");
    }
}
