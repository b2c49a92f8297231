//! # Caching System Module
//!
//! Turns GraphQL reads into cacheable `GET`s through a two-phase redirect.
//!
//! ## Architecture
//! 1. **Classifier**: decides whether a request is a cacheable query
//! 2. **Entity extraction**: finds the entity types a query reads
//! 3. **Key generator**: fingerprints a query together with the caller's identity
//! 4. **TTL table**: maps entities to freshness windows
//! 5. **Stores**: keep registered queries between the two phases
//! 6. **Middleware**: runs the register and fulfil phases

pub mod classifier;
pub mod entity;
pub mod key_generator;
pub mod middleware;
pub mod stores;
pub mod ttl;

pub use classifier::{classify, Classification, PassThroughReason};
pub use entity::extract_entities;
pub use key_generator::{extract_auth_headers, fingerprint, AuthContext};
pub use middleware::{CacheMiddleware, Registration, CACHE_PREFIX};
pub use stores::{InMemoryQueryStore, QueryRecord, QueryStore};
pub use ttl::EntityTtls;
