//! HTTP-backed implementations of the external seams.
//!
//! - `gateway`: matchmaking directory reached through an HTTP gateway
//! - `discord`: chat surface over a Discord-compatible REST API

pub mod discord;
pub mod gateway;

use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared HTTP client for all API requests to enable connection pooling
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(5)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build tuned HTTP client ({}), using defaults", e);
            reqwest::Client::new()
        })
});
