//! Errors surfaced by the chat core.

use crate::message::ChannelId;
use thiserror::Error;

/// Chat core errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The caller passed an out-of-range argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The channel is not registered.
    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),
}
