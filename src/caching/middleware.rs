//! # Cache Middleware
//!
//! The two-phase redirect protocol that makes GraphQL reads cacheable.
//!
//! ## Phase 1: register
//! A cacheable `POST` is fingerprinted and stored as a fresh [`QueryRecord`],
//! and the caller is sent `303 See Other` to `/_gcl/{fingerprint}`. Upstream is
//! not contacted.
//!
//! ## Phase 2: fulfil
//! A request to `/_gcl/{fingerprint}` replays the stored query upstream and
//! returns the answer with `Cache-Control`/`Expires` headers computed from the
//! query's entities, so that browsers and CDNs can cache the `GET`.
//!
//! The store lock is only ever held for a single map operation. Two concurrent
//! fulfilments of the same fingerprint both go upstream; nothing coalesces them.

use super::classifier::{classify, Classification, PassThroughReason};
use super::key_generator::{extract_auth_headers, fingerprint, is_fingerprint};
use super::stores::{QueryRecord, QueryStore};
use super::ttl::EntityTtls;
use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::logging::auth_header_names;
use crate::protocols::http::{into_axum_response, UpstreamClient};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Path prefix of fulfilment URLs
pub const CACHE_PREFIX: &str = "/_gcl/";

/// Format of the `Expires` header (RFC 7231 IMF-fixdate)
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `Expires` is never set more than a year ahead (RFC 2616 section 14.21)
const MAX_EXPIRES_IN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Result of running phase 1 on a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The query was stored; send the caller to `location`
    Redirect {
        fingerprint: String,
        location: String,
    },

    /// Not cacheable; the untouched body is handed back for forwarding
    PassThrough {
        reason: PassThroughReason,
        body: Bytes,
    },
}

/// Cache middleware
pub struct CacheMiddleware {
    /// Registered queries
    store: Arc<dyn QueryStore>,

    /// Per-entity freshness windows
    ttls: EntityTtls,

    /// Client for replaying queries upstream
    upstream: UpstreamClient,
}

impl CacheMiddleware {
    /// Create a new cache middleware
    pub fn new(store: Arc<dyn QueryStore>, ttls: EntityTtls, upstream: UpstreamClient) -> Self {
        Self {
            store,
            ttls,
            upstream,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    pub fn ttls(&self) -> &EntityTtls {
        &self.ttls
    }

    /// Phase 1: classify a buffered request and register it when cacheable.
    ///
    /// Registering an already known fingerprint overwrites the record, which
    /// also clears its expiry.
    pub fn register_query(
        &self,
        method: &Method,
        original_target: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Registration {
        let entities = match classify(method, headers, &body) {
            Classification::Cacheable { entities } => entities,
            Classification::PassThrough(reason) => {
                debug!(reason = %reason, "Request is not cacheable");
                return Registration::PassThrough { reason, body };
            }
        };

        let auth_headers = extract_auth_headers(headers);
        let fingerprint = fingerprint(&body, &auth_headers);

        info!(
            fingerprint = %fingerprint,
            entities = ?entities,
            auth_headers = %auth_header_names(&auth_headers),
            "Registered cacheable query"
        );

        self.store.put(
            &fingerprint,
            QueryRecord::new(body, auth_headers, entities, original_target),
        );

        Registration::Redirect {
            location: cache_location(&fingerprint),
            fingerprint,
        }
    }

    /// Look up a live record, discarding it if it has expired.
    ///
    /// An expired record is removed and the lookup is repeated exactly once,
    /// which picks up a record that phase 1 re-registered in the meantime.
    pub fn lookup(&self, fingerprint: &str) -> Option<QueryRecord> {
        for _ in 0..2 {
            let record = self.store.get(fingerprint)?;
            if !record.is_expired() {
                return Some(record);
            }

            if self.store.remove_if_expired(fingerprint, Instant::now()) {
                debug!(fingerprint = %fingerprint, "Removed expired query record");
            }
        }

        None
    }

    /// Phase 2: replay a registered query upstream and publish its freshness.
    ///
    /// `request_headers` are the fulfilment request's own headers; they form
    /// the base of the upstream request and the stored identity headers are
    /// laid over them.
    pub async fn fulfil_query(
        &self,
        fingerprint: &str,
        request_headers: &HeaderMap,
    ) -> GatewayResult<Response> {
        if !is_fingerprint(fingerprint) {
            return Err(GatewayError::cache_miss(fingerprint));
        }

        let record = self
            .lookup(fingerprint)
            .ok_or_else(|| GatewayError::cache_miss(fingerprint))?;

        let upstream = self
            .upstream
            .post_query(
                &record.original_target,
                request_headers,
                &record.auth_headers,
                record.body.clone(),
            )
            .await
            .map_err(|e| {
                warn!(fingerprint = %fingerprint, error = %e, "Failed to fulfil query");
                e
            })?;

        let ttl = self.ttls.resolve(&record.entities);
        match Instant::now().checked_add(ttl) {
            Some(expiry) => self.store.set_expiry(fingerprint, expiry),
            None => debug!(
                fingerprint = %fingerprint,
                ttl_secs = ttl.as_secs(),
                "TTL exceeds the clock range, record never expires"
            ),
        }

        info!(
            fingerprint = %fingerprint,
            status = upstream.status().as_u16(),
            ttl_secs = ttl.as_secs(),
            "Fulfilled query"
        );

        Ok(into_axum_response(
            upstream,
            cache_headers(ttl, Utc::now()),
            &[header::CACHE_CONTROL, header::EXPIRES],
        ))
    }
}

/// Fulfilment URL for a fingerprint
pub fn cache_location(fingerprint: &str) -> String {
    format!("{}{}", CACHE_PREFIX, fingerprint)
}

/// Last segment of a fulfilment path, ignoring trailing slashes
pub fn fingerprint_from_path(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// `Cache-Control` and `Expires` headers for a TTL starting at `now`
pub fn cache_headers(ttl: Duration, now: DateTime<Utc>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let cache_control = format!("max-age={}, public", ttl.as_secs());
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }

    let expires_at = chrono::Duration::from_std(ttl.min(MAX_EXPIRES_IN))
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now);
    if let Ok(value) = HeaderValue::from_str(&http_date(expires_at)) {
        headers.insert(header::EXPIRES, value);
    }

    headers
}

/// Format a timestamp as an HTTP date
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}
