//! Forwarding of load-balanced requests to a pool backend.
//!
//! The request body is buffered up to [`MAX_FORWARD_BODY`]; the backend's
//! response body is streamed back to the client as it arrives.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        HeaderMap, HeaderName, HeaderValue, Request, Response,
        header::{CONNECTION, HOST},
    },
};
use portico_core::BackendAddress;
use tracing::debug;

use crate::listener::ListenerKind;

/// Largest request body forwarded to a backend.
pub const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend {backend} unreachable: {source}")]
    Upstream {
        backend: BackendAddress,
        #[source]
        source: reqwest::Error,
    },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid response from backend {backend}: {reason}")]
    InvalidResponse {
        backend: BackendAddress,
        reason: String,
    },
}

/// Removes hop-by-hop headers, including those named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Builds the headers sent to the backend.
fn forwarded_headers(
    original: &HeaderMap,
    peer: Option<SocketAddr>,
    listener: Option<ListenerKind>,
) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);

    if let Some(peer) = peer {
        let client_ip = peer.ip().to_string();
        let chain = match original
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{}, {}", existing, client_ip),
            None => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }
    }

    if let Some(host) = original.get(HOST) {
        headers.insert(X_FORWARDED_HOST.clone(), host.clone());
    }

    let proto = match listener {
        Some(ListenerKind::Https) => "https",
        _ => "http",
    };
    headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static(proto));

    headers
}

/// Forwards `request` to `backend` and returns its response.
pub async fn forward(
    client: &reqwest::Client,
    backend: &BackendAddress,
    request: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("http://{}{}", backend.authority(), path_and_query);

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let listener = parts.extensions.get::<ListenerKind>().copied();
    let headers = forwarded_headers(&parts.headers, peer, listener);

    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|_| ProxyError::BodyTooLarge {
            limit: MAX_FORWARD_BODY,
        })?;

    debug!(backend = %backend, url = %url, "Forwarding request");

    let upstream = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|source| ProxyError::Upstream {
            backend: backend.clone(),
            source,
        })?;

    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut builder = Response::builder().status(upstream.status());
    if let Some(headers) = builder.headers_mut() {
        *headers = response_headers;
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ProxyError::InvalidResponse {
            backend: backend.clone(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("accept", HeaderValue::from_static("text/html"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("accept"));
    }

    #[test]
    fn test_forwarded_headers_appends_client_ip() {
        let mut original = HeaderMap::new();
        original.insert(HOST, HeaderValue::from_static("edge.example.com"));
        original.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

        let peer: SocketAddr = "198.51.100.2:4242".parse().unwrap();
        let headers = forwarded_headers(&original, Some(peer), Some(ListenerKind::Balancer));

        assert!(headers.get(HOST).is_none());
        assert_eq!(headers["x-forwarded-for"], "203.0.113.7, 198.51.100.2");
        assert_eq!(headers["x-forwarded-host"], "edge.example.com");
        assert_eq!(headers["x-forwarded-proto"], "http");
    }

    #[test]
    fn test_forwarded_headers_without_peer() {
        let headers = forwarded_headers(&HeaderMap::new(), None, Some(ListenerKind::Https));

        assert!(headers.get("x-forwarded-for").is_none());
        assert_eq!(headers["x-forwarded-proto"], "https");
    }
}
