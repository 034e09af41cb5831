//! Admin REST API
//!
//! Typed records for every collection the dashboard manages, plus an HTTP
//! client (behind the `api` feature) authenticating with a bearer token.

pub mod types;

#[cfg(feature = "api")]
mod client;

#[cfg(feature = "api")]
pub use client::ApiClient;
