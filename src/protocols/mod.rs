//! # Protocol Handlers
//!
//! Upstream HTTP plumbing shared by the forwarder and the fulfilment path.

pub mod http;

pub use http::{into_axum_response, UpstreamClient};
