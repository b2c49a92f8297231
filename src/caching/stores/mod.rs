//! # Query Stores
//!
//! Storage for registered queries, keyed by fingerprint. A record is created
//! when a cacheable request is redirected and is only ever mutated afterwards
//! to move its expiry forward after an upstream round-trip.

pub mod memory;

pub use memory::InMemoryQueryStore;

use crate::caching::key_generator::AuthContext;
use bytes::Bytes;
use std::time::{Duration, Instant};

/// A registered query waiting for (or already past) fulfilment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    /// Raw body of the original request
    pub body: Bytes,

    /// Identity headers captured when the query was registered
    pub auth_headers: AuthContext,

    /// Entities the query reads, in first-seen order
    pub entities: Vec<String>,

    /// Path and query string of the original request
    pub original_target: String,

    /// `None` until the record has been fulfilled once
    pub expiry: Option<Instant>,
}

impl QueryRecord {
    /// Create a fresh, never-fulfilled record
    pub fn new(
        body: Bytes,
        auth_headers: AuthContext,
        entities: Vec<String>,
        original_target: impl Into<String>,
    ) -> Self {
        Self {
            body,
            auth_headers,
            entities,
            original_target: original_target.into(),
            expiry: None,
        }
    }

    /// A record is expired once its expiry lies in the past.
    /// Never-fulfilled records never expire.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expiry, Some(expiry) if now > expiry)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry, if the record has been fulfilled
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expiry
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
    }
}

/// Trait for query store implementations
///
/// Implementations must be safe for many concurrent readers and writers.
/// None of these calls may block on I/O.
pub trait QueryStore: Send + Sync {
    /// Insert or overwrite the record for a fingerprint
    fn put(&self, fingerprint: &str, record: QueryRecord);

    /// Get a snapshot of the record for a fingerprint
    fn get(&self, fingerprint: &str) -> Option<QueryRecord>;

    /// Move a record's expiry; does nothing when the record is gone
    fn set_expiry(&self, fingerprint: &str, expiry: Instant);

    /// Remove a record, returning whether one existed
    fn delete(&self, fingerprint: &str) -> bool;

    /// Remove the record only if it is expired at `now`.
    ///
    /// Check and removal happen under one lock so that a record re-registered
    /// in between is left alone.
    fn remove_if_expired(&self, fingerprint: &str, now: Instant) -> bool;

    /// Number of stored records
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
