//! Transport between the sampler process and the consumer process.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── consumer process ────────────────┐
//! │  TransportServer ──WireMessage──▶ consumer task   │
//! │    │ Supervisor (NotStarted/Launching/...)        │
//! │    │ ProcessLauncher ──spawn──┐                   │
//! └────┼──────────────────────────┼───────────────────┘
//!      │ websocket, JSON frames   ▼
//! ┌────┴────────── sampler process ──────────────────┐
//! │  SamplerLink ◀── Sampler (directory + sweeps)     │
//! └───────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod codec;
pub mod launcher;
pub mod server;
pub mod supervisor;

pub use client::SamplerLink;
pub use codec::{decode_frame, encode_message, FrameError, WireMessage};
pub use launcher::{LaunchedProcess, Launcher, ProcessLauncher};
pub use server::TransportServer;
pub use supervisor::{Supervisor, SupervisorState};
