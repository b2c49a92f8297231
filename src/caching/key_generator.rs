//! # Fingerprint Generation
//!
//! A fingerprint is the cache key of a query: a SHA-256 digest over the raw
//! request body followed by the identity headers captured from the request.
//! Authorization is part of the key, so two callers only share an answer when
//! they send the same query with the same credentials.

use axum::http::{HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Identity headers captured from a request, ordered by header name.
///
/// Values are kept as raw header bytes; they are hashed and replayed exactly
/// as the caller sent them.
pub type AuthContext = BTreeMap<String, HeaderValue>;

/// Header name fragments that mark a header as identity-bearing
pub const AUTH_HEADER_PATTERNS: [&str; 7] = [
    "Authorization",
    "Auth",
    "X-Auth",
    "Api-Key",
    "X-Api-Key",
    "Bearer",
    "Token",
];

/// Capture every header whose name contains one of [`AUTH_HEADER_PATTERNS`].
///
/// Matching is case-insensitive. Only the first value of a repeated header is
/// kept. Names are stored in the lower-case form `http` normalises them to.
pub fn extract_auth_headers(headers: &HeaderMap) -> AuthContext {
    let mut auth_headers = AuthContext::new();

    for name in headers.keys() {
        let lowered = name.as_str().to_ascii_lowercase();
        let is_auth = AUTH_HEADER_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(&pattern.to_ascii_lowercase()));

        if !is_auth {
            continue;
        }

        if let Some(value) = headers.get(name) {
            auth_headers.insert(name.as_str().to_string(), value.clone());
        }
    }

    auth_headers
}

/// Compute the fingerprint of a query body and its identity headers.
///
/// The digest covers the body, then `name:value\n` for every captured header
/// in lexicographic name order. The result is 64 lower-case hex characters.
pub fn fingerprint(body: &[u8], auth_headers: &AuthContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);

    // BTreeMap iteration is already sorted by key.
    for (name, value) in auth_headers {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }

    hex::encode(hasher.finalize())
}

/// Check that a path segment has the shape of a fingerprint
pub fn is_fingerprint(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
