//! Deribit WebSocket Client Library
//!
//! A persistent-connection JSON-RPC client for the Deribit trading venue.
//! Calls are multiplexed over one WebSocket with asynchronous push
//! notifications, which are routed to per-channel listeners.
//!
//! # Modules
//!
//! - `config`: Configuration loading and validation from .properties files
//! - `error`: Error types shared by every layer
//! - `protocol`: JSON-RPC envelopes, typed requests and inbound frame decoding
//! - `transport`: WebSocket dialling with TLS support
//! - `rpc`: Call/response correlation over a live connection
//! - `auth`: Access token holder gating `private/` methods
//! - `subscription`: Channel wish-list and active-set bookkeeping
//! - `dispatcher`: Fan-out of notifications to per-channel listeners
//! - `stats`: Call round-trip latency histogram
//! - `client`: Connection lifecycle and the public facade

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod stats;
pub mod subscription;
pub mod transport;

// Re-export main types for convenience
pub use client::{Client, ConnectionState};
pub use config::{Config, Configuration, REAL_BASE_URL, TEST_BASE_URL};
pub use dispatcher::Listener;
pub use error::{ClientError, ClientResult};
pub use protocol::{Event, Request};
pub use stats::LatencyStats;
