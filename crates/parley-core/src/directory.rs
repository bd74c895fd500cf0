//! Channel id to log mapping.
//!
//! A channel exists iff it has an entry here, whether or not anything has been
//! posted to it yet.

use crate::log::ChannelLog;
use crate::message::ChannelId;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Directory of channel logs.
#[derive(Debug, Default)]
pub struct LogDirectory {
    logs: DashMap<ChannelId, Arc<ChannelLog>>,
}

impl LogDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel.
    ///
    /// Registering a known channel keeps its existing log.
    /// Returns `true` if the channel was new.
    pub fn register(&self, channel_id: &str) -> bool {
        let mut created = false;
        self.logs.entry(channel_id.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(ChannelLog::new(channel_id))
        });

        if created {
            debug!(channel = %channel_id, "Registered channel");
        }
        created
    }

    /// Check if a channel is registered.
    #[must_use]
    pub fn exists(&self, channel_id: &str) -> bool {
        self.logs.contains_key(channel_id)
    }

    /// Get the log for a channel.
    #[must_use]
    pub fn log_for(&self, channel_id: &str) -> Option<Arc<ChannelLog>> {
        self.logs.get(channel_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Get all registered channel ids.
    #[must_use]
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.logs.iter().map(|e| e.key().clone()).collect()
    }

    /// Get the number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Check if no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
