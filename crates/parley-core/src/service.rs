//! Post, fetch and subscribe on top of the log directory and live broadcaster.

use crate::broadcast::{BatchStream, LiveBroadcaster, LiveStats, DEFAULT_CAPACITY, DEFAULT_WINDOW};
use crate::clock::{Clock, SystemClock};
use crate::directory::LogDirectory;
use crate::error::ChatError;
use crate::log::check_page_size;
use crate::message::{Message, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chat service configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Live batching window.
    pub window: Duration,
    /// Live broadcast buffer capacity. Zero is treated as one.
    pub broadcast_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            broadcast_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// The chat core.
///
/// Writers and subscribers must target a registered channel; history reads on
/// an unknown channel simply come back empty.
pub struct ChatService {
    directory: LogDirectory,
    broadcaster: LiveBroadcaster,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    /// Create a service with default configuration and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChatConfig::default(), Arc::new(SystemClock))
    }

    /// Create a service with custom configuration and clock.
    #[must_use]
    pub fn with_config(config: ChatConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Creating chat service with config: {:?}", config);
        Self {
            directory: LogDirectory::new(),
            broadcaster: LiveBroadcaster::new(config.window, config.broadcast_capacity.max(1)),
            clock,
        }
    }

    /// Register a channel. Returns `true` if it was new.
    pub fn register_channel(&self, channel_id: &str) -> bool {
        self.directory.register(channel_id)
    }

    /// Check if a channel is registered.
    #[must_use]
    pub fn channel_exists(&self, channel_id: &str) -> bool {
        self.directory.exists(channel_id)
    }

    /// Post a message.
    ///
    /// The message is appended before it is published; delivery to live
    /// subscribers is best-effort and never fails the post.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownChannel`] if the channel is not registered.
    pub fn post_message(
        &self,
        channel_id: &str,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Arc<Message>, ChatError> {
        let log = self
            .directory
            .log_for(channel_id)
            .ok_or_else(|| ChatError::UnknownChannel(channel_id.to_string()))?;

        // Publish under the channel's write lock so live order matches append order.
        let mut receivers = 0;
        let message = log.append_with(author, body, self.clock.now(), |message| {
            receivers = self.broadcaster.publish(Arc::clone(message));
        });

        debug!(
            channel = %channel_id,
            sequence = message.sequence_number,
            receivers,
            "Posted message"
        );
        Ok(message)
    }

    /// Fetch message history. See [`ChannelLog::find_latest`](crate::ChannelLog::find_latest).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidArgument`] if `max_count` is zero.
    pub fn fetch_history(
        &self,
        channel_id: &str,
        max_count: usize,
        after: Option<&MessageId>,
    ) -> Result<Vec<Arc<Message>>, ChatError> {
        check_page_size(max_count)?;

        match self.directory.log_for(channel_id) {
            Some(log) => log.find_latest(max_count, after),
            None => Ok(Vec::new()),
        }
    }

    /// Get the newest message in a channel.
    #[must_use]
    pub fn latest_message(&self, channel_id: &str) -> Option<Arc<Message>> {
        self.directory.log_for(channel_id)?.latest()
    }

    /// Subscribe to live batches of a channel's new messages.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownChannel`] if the channel is not registered.
    pub fn live_messages(&self, channel_id: &str) -> Result<BatchStream, ChatError> {
        if !self.directory.exists(channel_id) {
            warn!(channel = %channel_id, "Live subscription to unknown channel");
            return Err(ChatError::UnknownChannel(channel_id.to_string()));
        }
        Ok(self.broadcaster.subscribe(channel_id))
    }

    /// Get the log directory.
    #[must_use]
    pub fn directory(&self) -> &LogDirectory {
        &self.directory
    }

    /// Get live broadcaster statistics.
    #[must_use]
    pub fn live_stats(&self) -> LiveStats {
        self.broadcaster.stats()
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new()
    }
}
