//! # In-Memory Query Store
//!
//! A `HashMap` behind a `parking_lot::RwLock`. Lookups share the read lock;
//! inserts, expiry updates and removals take the write lock. Locks are held
//! only for the map operation itself and never across an await point.
//!
//! The store is unbounded: records leave it only when they are found expired
//! on lookup.

use super::{QueryRecord, QueryStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// In-memory query store implementation
#[derive(Debug, Default)]
pub struct InMemoryQueryStore {
    records: RwLock<HashMap<String, QueryRecord>>,
}

impl InMemoryQueryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryStore for InMemoryQueryStore {
    fn put(&self, fingerprint: &str, record: QueryRecord) {
        let previous = self.records.write().insert(fingerprint.to_string(), record);

        if previous.is_some() {
            debug!(fingerprint = %fingerprint, "Replaced registered query");
        }
    }

    fn get(&self, fingerprint: &str) -> Option<QueryRecord> {
        self.records.read().get(fingerprint).cloned()
    }

    fn set_expiry(&self, fingerprint: &str, expiry: Instant) {
        if let Some(record) = self.records.write().get_mut(fingerprint) {
            record.expiry = Some(expiry);
        }
    }

    fn delete(&self, fingerprint: &str) -> bool {
        self.records.write().remove(fingerprint).is_some()
    }

    fn remove_if_expired(&self, fingerprint: &str, now: Instant) -> bool {
        let mut records = self.records.write();

        let expired = records
            .get(fingerprint)
            .map(|record| record.is_expired_at(now))
            .unwrap_or(false);

        if expired {
            records.remove(fingerprint);
        }

        expired
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::key_generator::AuthContext;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(target: &str) -> QueryRecord {
        QueryRecord::new(
            Bytes::from_static(br#"{"query":"query { User { id } }"}"#),
            AuthContext::new(),
            vec!["User".to_string()],
            target,
        )
    }

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryQueryStore::new();
        assert!(store.is_empty());

        store.put("abc", record("/graphql"));
        let stored = store.get("abc").unwrap();
        assert_eq!(stored.original_target, "/graphql");
        assert_eq!(store.len(), 1);

        assert!(store.delete("abc"));
        assert!(!store.delete("abc"));
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn test_put_overwrites_and_resets_expiry() {
        let store = InMemoryQueryStore::new();
        store.put("abc", record("/"));
        store.set_expiry("abc", Instant::now() + Duration::from_secs(30));
        assert!(store.get("abc").unwrap().expiry.is_some());

        store.put("abc", record("/v2"));
        let stored = store.get("abc").unwrap();
        assert!(stored.expiry.is_none());
        assert_eq!(stored.original_target, "/v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_expiry_on_missing_record_is_noop() {
        let store = InMemoryQueryStore::new();
        store.set_expiry("missing", Instant::now());
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_if_expired() {
        let store = InMemoryQueryStore::new();
        let now = Instant::now();

        store.put("fresh", record("/"));
        store.put("live", record("/"));
        store.set_expiry("live", now + Duration::from_secs(60));
        store.put("stale", record("/"));
        store.set_expiry("stale", now);

        let later = now + Duration::from_secs(1);
        assert!(!store.remove_if_expired("fresh", later));
        assert!(!store.remove_if_expired("live", later));
        assert!(store.remove_if_expired("stale", later));
        assert!(!store.remove_if_expired("missing", later));

        assert_eq!(store.len(), 2);
        assert!(store.get("stale").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(InMemoryQueryStore::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{}-{}", worker, i);
                        store.put(&key, record("/"));
                        store.set_expiry(&key, Instant::now() + Duration::from_secs(60));
                        assert!(store.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 800);
    }
}
