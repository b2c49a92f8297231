//! # Gateway Module
//!
//! The HTTP server that fronts the upstream GraphQL endpoint.

pub mod server;

pub use server::{GatewayServer, ServerState};
