//! optic-api — HTTP transport for the remote inference server.
//!
//! Provides the request side of every workflow: image and JSON POSTs,
//! endpoint routing, and the remote face-compare scorer.

pub mod client;
pub mod scorer;

pub use client::{ApiClient, ApiError, ClientOptions, Endpoint};
pub use scorer::RemoteScorer;
