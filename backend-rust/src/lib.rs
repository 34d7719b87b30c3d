//! # screen-server
//!
//! Receives binary telemetry frames from on-board devices over UDP and pushes
//! the decoded events to passenger display screens over WebSocket.

pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod ingest;
pub mod protocol;
pub mod registry;
pub mod route_store;
pub mod state;

pub use config::ServerConfig;
pub use error::{DecodeError, HubError};
pub use ingest::{start_ingest, IngestHandle};
pub use state::{AppState, SharedState};
