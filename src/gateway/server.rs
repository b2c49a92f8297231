//! # HTTP Server Module
//!
//! The axum server that fronts the upstream GraphQL endpoint. Requests under
//! `/_gcl/` are fulfilment requests for registered queries. Anything that is
//! not a JSON `POST` is streamed to upstream without being read. JSON `POST`s
//! are buffered up to `max_body_size`, classified, and either registered
//! (answered with a `303`) or forwarded to upstream verbatim.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing the cache middleware across request tasks
//! - Axum's handler system with `State` extraction
//! - `ConnectInfo` from request extensions for `X-Forwarded-For`
//! - Graceful shutdown driven by `tokio::signal`

use crate::caching::classifier::precheck;
use crate::caching::middleware::{fingerprint_from_path, CacheMiddleware, Registration, CACHE_PREFIX};
use crate::caching::stores::{InMemoryQueryStore, QueryStore};
use crate::core::config::ProxyConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::logging::RequestId;
use crate::protocols::http::{stream_body, UpstreamClient};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::Response,
    routing::any,
    Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    /// Redirect protocol handler
    pub cache: Arc<CacheMiddleware>,

    /// Client used for pass-through requests
    pub upstream: UpstreamClient,

    /// Largest JSON `POST` body that will be buffered for classification
    pub max_body_size: usize,
}

/// Caching proxy server
pub struct GatewayServer {
    state: ServerState,
    config: ProxyConfig,
    app: AxumRouter,
}

impl GatewayServer {
    /// Create a server backed by a fresh in-memory store
    pub fn new(config: ProxyConfig) -> GatewayResult<Self> {
        Self::with_store(config, Arc::new(InMemoryQueryStore::new()))
    }

    /// Create a server that registers queries in `store`
    pub fn with_store(config: ProxyConfig, store: Arc<dyn QueryStore>) -> GatewayResult<Self> {
        config.validate()?;

        let upstream = UpstreamClient::new(config.endpoint.clone(), config.upstream_timeout)?;
        let cache = Arc::new(CacheMiddleware::new(
            store,
            config.cache_times.clone(),
            upstream.clone(),
        ));

        let state = ServerState {
            cache,
            upstream,
            max_body_size: config.max_body_size,
        };

        let app = Self::create_app(state.clone());

        Ok(Self { state, config, app })
    }

    fn create_app(state: ServerState) -> AxumRouter {
        let fulfil_route = format!("{}*fingerprint", CACHE_PREFIX);

        AxumRouter::new()
            .route(CACHE_PREFIX, any(handle_cached_query))
            .route(&fulfil_route, any(handle_cached_query))
            .fallback(handle_request)
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// The request router, for serving or for driving directly in tests
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind the listener and serve until a shutdown signal arrives
    #[instrument(skip(self))]
    pub async fn start(self) -> GatewayResult<()> {
        let bind_addr = self.config.listen_addr()?;

        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind server to {}: {}", bind_addr, e))
        })?;

        info!(
            address = %bind_addr,
            endpoint = %self.config.endpoint,
            "Caching proxy listening"
        );

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))?;

        info!("Caching proxy stopped");
        Ok(())
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        self.config.listen_addr()
    }
}

/// Handler for everything outside `/_gcl/`: register or forward
#[instrument(skip(state, request), fields(request_id, method, path))]
async fn handle_request(
    State(state): State<ServerState>,
    request: Request,
) -> GatewayResult<Response> {
    let request_id = RequestId::new();
    let (parts, body) = request.into_parts();

    tracing::Span::current()
        .record("request_id", request_id.as_str())
        .record("method", parts.method.as_str())
        .record("path", parts.uri.path());

    let client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let target = original_target(&parts.uri);

    if let Some(reason) = precheck(&parts.method, &parts.headers) {
        debug!(reason = %reason, target = %target, "Streaming request upstream");
        return state
            .upstream
            .forward(
                &parts.method,
                &target,
                &parts.headers,
                stream_body(body),
                client_addr,
            )
            .await;
    }

    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to read request body");
            GatewayError::body_read(e.to_string())
        })?;

    match state
        .cache
        .register_query(&parts.method, &target, &parts.headers, body)
    {
        Registration::Redirect { location, .. } => Ok(redirect_response(&location)),
        Registration::PassThrough { reason, body } => {
            debug!(reason = %reason, target = %target, "Forwarding request upstream");
            state
                .upstream
                .forward(&parts.method, &target, &parts.headers, body.into(), client_addr)
                .await
        }
    }
}

/// Handler for `/_gcl/{fingerprint}`, any method
#[instrument(skip(state, headers), fields(request_id, fingerprint))]
async fn handle_cached_query(
    State(state): State<ServerState>,
    uri: Uri,
    headers: HeaderMap,
) -> GatewayResult<Response> {
    let request_id = RequestId::new();
    let fingerprint = fingerprint_from_path(uri.path());

    tracing::Span::current()
        .record("request_id", request_id.as_str())
        .record("fingerprint", fingerprint);

    state.cache.fulfil_query(fingerprint, &headers).await
}

/// Path and query of the inbound request as the client sent it
fn original_target(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// `303 See Other` with an empty body
fn redirect_response(location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SEE_OTHER;

    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }

    response
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
