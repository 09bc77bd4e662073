use thiserror::Error;
use tidepool_events::{InteractionRef, InteractionReply, OutgoingMessage};

use crate::command::CommandDescriptor;

/// Failure of an outbound call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid {what}: {value}")]
    InvalidId { what: &'static str, value: String },

    #[error("transport is not connected")]
    Disconnected,
}

/// The outbound side of the chat integration
///
/// Calls are made from the engine thread and block until the remote side
/// answers or the implementation's own timeout elapses.
pub trait Transport: Send + Sync {
    /// Post a message; returns the new message id
    fn send_message(&self, channel_id: &str, message: &OutgoingMessage)
        -> Result<String, TransportError>;

    fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError>;

    fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError>;

    fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError>;

    fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError>;

    fn respond_to_interaction(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), TransportError>;

    /// Publish a command definition to the chat service
    fn register_command(&self, command: &CommandDescriptor) -> Result<(), TransportError>;

    /// Resolve a channel name to its id
    fn find_channel(&self, name: &str) -> Result<Option<String>, TransportError>;
}
