//! Message records shared by the channel logs and the live stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A channel identifier.
pub type ChannelId = String;

/// Opaque unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message appended to a channel.
///
/// Messages are immutable once built; logs and subscribers share them behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub message_id: MessageId,
    /// Channel the message was posted to.
    pub channel_id: ChannelId,
    /// Author identifier.
    pub author: String,
    /// Per-channel position, starting at 1.
    pub sequence_number: u64,
    /// Message text.
    pub body: String,
    /// When the message was posted, as reported by the service clock.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub(crate) fn new(
        channel_id: impl Into<ChannelId>,
        sequence_number: u64,
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: MessageId::generate(),
            channel_id: channel_id.into(),
            author: author.into(),
            sequence_number,
            body: body.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_message_ids() {
        let id1 = MessageId::generate();
        let id2 = MessageId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let msg = Message::new("general", 1, "alice", "hello", Utc::now());
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["channelId"], "general");
        assert_eq!(value["sequenceNumber"], 1);
        assert_eq!(value["messageId"], msg.message_id.as_str());
    }
}
