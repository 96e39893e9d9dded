//! lobby-relay - Lobby directory sampler and chat status relay
//!
//! This library crate exposes internal modules for integration testing.

pub mod config;
pub mod consumer;
pub mod data;
pub mod directory;
pub mod display;
pub mod integrations;
pub mod presence;
pub mod reconcile;
pub mod sampler;
pub mod store;
pub mod surface;
pub mod transport;
pub mod util;
