//! # Upstream HTTP Client
//!
//! Everything that talks to the upstream GraphQL endpoint:
//! - verbatim forwarding of requests the cache does not handle,
//! - the `POST` replay of a registered query during fulfilment,
//! - conversion of upstream responses back into axum responses.
//!
//! ## Rust Concepts Used
//!
//! - `reqwest` is built on the 0.2 line of the `http` crate while axum 0.7 uses
//!   `http` 1.0, so methods, header names and values cross between the two as
//!   raw bytes.
//! - Response bodies are streamed back to the caller rather than buffered.

use crate::caching::key_generator::AuthContext;
use crate::core::error::{GatewayError, GatewayResult};
use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use url::Url;

/// Headers that describe a single connection and are never relayed
const HOP_BY_HOP_HEADERS: [&str; 10] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Chunks buffered between an inbound body and its upstream request
const BODY_CHANNEL_CAPACITY: usize = 16;

/// HTTP client bound to one upstream endpoint
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl UpstreamClient {
    /// Create a client for `endpoint`.
    ///
    /// Redirects from upstream are relayed to the caller, not followed.
    pub fn new(endpoint: Url, timeout: Option<Duration>) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Map an inbound path and query string onto the upstream endpoint.
    ///
    /// The inbound path is joined to the endpoint path with a single slash; a
    /// bare `/` targets the endpoint itself. Query strings from both sides are
    /// kept, endpoint first.
    pub fn upstream_url(&self, path_and_query: &str) -> Url {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };

        let mut url = self.endpoint.clone();

        if !path.is_empty() && path != "/" {
            let joined = format!(
                "{}/{}",
                self.endpoint.path().trim_end_matches('/'),
                path.trim_start_matches('/')
            );
            url.set_path(&joined);
        }

        let merged_query = match (self.endpoint.query(), query) {
            (Some(base), Some(extra)) if !base.is_empty() && !extra.is_empty() => {
                Some(format!("{}&{}", base, extra))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(extra)) if !extra.is_empty() => Some(extra.to_string()),
            _ => None,
        };
        url.set_query(merged_query.as_deref());

        url
    }

    /// Relay a request to upstream unmodified and return its response verbatim.
    pub async fn forward(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: reqwest::Body,
        client_addr: Option<SocketAddr>,
    ) -> GatewayResult<Response> {
        let url = self.upstream_url(path_and_query);
        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| GatewayError::internal(format!("Unsupported method {}: {}", method, e)))?;

        let mut outbound = to_reqwest_headers(headers);
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut outbound, addr);
        }

        debug!(method = %method, url = %url, "Forwarding request upstream");

        let upstream = self
            .client
            .request(method, url)
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Upstream request failed");
                GatewayError::from(e)
            })?;

        Ok(into_axum_response(upstream, HeaderMap::new(), &[]))
    }

    /// Replay a registered query against upstream.
    ///
    /// `base_headers` (the fulfilment request's headers) are sent first, then
    /// the captured identity headers override them, then the content type is
    /// forced to JSON.
    pub async fn post_query(
        &self,
        original_target: &str,
        base_headers: &HeaderMap,
        auth_headers: &AuthContext,
        body: Bytes,
    ) -> GatewayResult<reqwest::Response> {
        let url = self.upstream_url(original_target);

        let outbound = replay_headers(base_headers, auth_headers);

        debug!(url = %url, "Replaying registered query upstream");

        let response = self
            .client
            .post(url)
            .headers(outbound)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }
}

/// Whether a header is connection-scoped and must not be relayed
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| name.eq_ignore_ascii_case(hop))
}

/// Names listed in a `Connection` header are connection-scoped as well
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Copy inbound headers for an upstream request.
///
/// Drops hop-by-hop headers, `Host` (the client sets it from the URL) and
/// `Content-Length` (recomputed from the body).
fn to_reqwest_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let listed = connection_listed(headers);
    let mut outbound = reqwest::header::HeaderMap::new();

    for (name, value) in headers.iter() {
        let name = name.as_str();
        if is_hop_by_hop(name)
            || name == "host"
            || name == "content-length"
            || listed.iter().any(|listed| listed == name)
        {
            continue;
        }

        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            outbound.append(name, value);
        }
    }

    outbound
}

/// Headers for a query replay: `base` first, identity headers laid over it
/// byte for byte, then a JSON content type.
fn replay_headers(base: &HeaderMap, auth_headers: &AuthContext) -> reqwest::header::HeaderMap {
    let mut outbound = to_reqwest_headers(base);

    for (name, value) in auth_headers {
        match (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                outbound.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping unrepresentable identity header"),
        }
    }

    outbound.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    outbound
}

/// Stream an inbound body to upstream without buffering it.
///
/// reqwest needs a `Sync` stream and axum bodies are not, so the chunks are
/// pumped through a channel by a spawned task. A body known to be empty is
/// sent as an empty body rather than a chunked one.
pub fn stream_body(body: Body) -> reqwest::Body {
    if body.size_hint().exact() == Some(0) {
        return reqwest::Body::from(Bytes::new());
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, axum::Error>>(BODY_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

/// Append the client address to `X-Forwarded-For`, keeping earlier hops
fn append_forwarded_for(headers: &mut reqwest::header::HeaderMap, addr: SocketAddr) {
    let client_ip = addr.ip().to_string();

    let prior: Vec<String> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();

    let forwarded = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = reqwest::header::HeaderValue::from_str(&forwarded) {
        headers.insert("x-forwarded-for", value);
    }
}

/// Turn an upstream response into an axum response.
///
/// `preset` headers are written first and any upstream header named in
/// `superseded` is dropped in their favour. Hop-by-hop headers and
/// `Content-Length` are not copied; the body is streamed.
pub fn into_axum_response(
    upstream: reqwest::Response,
    preset: HeaderMap,
    superseded: &[HeaderName],
) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = preset;
    for (name, value) in upstream.headers().iter() {
        let name = name.as_str();
        if is_hop_by_hop(name)
            || name == "content-length"
            || superseded.iter().any(|skip| skip.as_str() == name)
        {
            continue;
        }

        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
