//! # graphcl - GraphQL Caching Proxy
//!
//! A reverse proxy that sits in front of a GraphQL endpoint and makes read
//! queries cacheable by ordinary HTTP caches.
//!
//! GraphQL clients send queries as `POST`, which browsers and CDNs never cache.
//! The proxy registers a cacheable query under a fingerprint of its body and the
//! caller's identity headers, then answers `303 See Other` pointing at
//! `/_gcl/{fingerprint}`. The follow-up `GET` is answered from upstream with
//! `Cache-Control` and `Expires` derived from the entity types the query reads.
//! Mutations and anything that is not a JSON query are forwarded untouched.
//!
//! ## Module Layout
//!
//! - `core`: error types, configuration layering and the command line
//! - `caching`: classification, fingerprints, TTLs, the query store and the
//!   redirect protocol itself
//! - `protocols`: the upstream HTTP client
//! - `gateway`: the axum server
//! - `observability`: structured logging

/// Error types, configuration and command-line handling
pub mod core;

/// The axum server and its request handlers
pub mod gateway;

/// Upstream HTTP client used for forwarding and fulfilment
pub mod protocols;

/// Structured logging setup
pub mod observability;

/// Query classification, fingerprinting, TTLs and the query store
pub mod caching;

/// Main error type used throughout the proxy
pub use core::error::{GatewayError, GatewayResult};

/// Resolved and layered configuration
pub use core::config::{PartialProxyConfig, ProxyConfig};

/// The server itself, the primary entry point for using this library
pub use gateway::server::{GatewayServer, ServerState};
