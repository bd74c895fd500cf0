//! # parley-server
//!
//! HTTP and WebSocket front end for the Parley chat core: configuration,
//! channel naming, metrics and the axum application.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod registry;

pub use config::Config;
pub use handlers::{app, run_server, AppState};
pub use registry::{ChannelInfo, ChannelRegistry, ChannelSummary};
