//! # parley-core
//!
//! Ordered per-channel message logs and live fan-out for the Parley chat backend.
//!
//! This crate provides the building blocks:
//!
//! - **ChannelLog** - Append-only, strictly sequenced message log for one channel
//! - **LogDirectory** - Channel id to log mapping; a channel exists iff it is registered here
//! - **LiveBroadcaster** - Multicast stream of new messages, batched per time window
//! - **ChatService** - Post / fetch / subscribe with channel-existence checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  post       │────▶│ LogDirectory │────▶│ ChannelLog  │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────────┐     ┌──────────────────────────┐
//! │ LiveBroadcaster │────▶│ per-subscriber batching  │
//! └─────────────────┘     └──────────────────────────┘
//! ```
//!
//! The crate is transport-agnostic: it hands out [`Message`] records, ordered
//! pages of them, and streams of batches.

pub mod broadcast;
pub mod clock;
pub mod directory;
pub mod error;
pub mod log;
pub mod message;
pub mod service;

pub use broadcast::{BatchStream, LiveBroadcaster, LiveStats, DEFAULT_WINDOW};
pub use clock::{Clock, FixedClock, SystemClock};
pub use directory::LogDirectory;
pub use error::ChatError;
pub use log::ChannelLog;
pub use message::{ChannelId, Message, MessageId};
pub use service::{ChatConfig, ChatService};
