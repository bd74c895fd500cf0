//! Named channels.
//!
//! The chat core only knows channel ids. The registry gives channels a
//! display name, assigns their ids and announces them to the core.

use dashmap::DashMap;
use parley_core::{ChannelId, ChatService, Message};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid channel name.
    #[error("Invalid channel name: {0}")]
    InvalidName(&'static str),
}

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
}

/// A channel with its newest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    /// Channel id.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
    /// Newest message, if anything has been posted.
    pub last_message: Option<Message>,
}

/// Channel registry backed by the chat core.
pub struct ChannelRegistry {
    channels: DashMap<ChannelId, ChannelInfo>,
    chat: Arc<ChatService>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            channels: DashMap::new(),
            chat,
        }
    }

    /// Create a channel with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn create(&self, name: &str) -> Result<ChannelInfo, RegistryError> {
        validate_channel_name(name).map_err(RegistryError::InvalidName)?;

        let info = ChannelInfo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        // Core first, so a listed channel always accepts posts.
        self.chat.register_channel(&info.id);
        self.channels.insert(info.id.clone(), info.clone());

        info!(channel = %info.id, name = %info.name, "Created channel");
        Ok(info)
    }

    /// Get all channels sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ChannelSummary> {
        let mut channels: Vec<ChannelSummary> = self
            .channels
            .iter()
            .map(|entry| self.summarize(entry.value()))
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        channels
    }

    /// Get a channel by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ChannelSummary> {
        self.channels.get(id).map(|entry| self.summarize(entry.value()))
    }

    /// Get the number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn summarize(&self, info: &ChannelInfo) -> ChannelSummary {
        ChannelSummary {
            id: info.id.clone(),
            name: info.name.clone(),
            last_message: self
                .chat
                .latest_message(&info.id)
                .map(|m| Message::clone(&m)),
        }
    }
}
