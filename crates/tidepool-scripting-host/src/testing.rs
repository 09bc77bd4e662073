//! In-memory transport for tests and offline script development.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tidepool_events::{InteractionRef, InteractionReply, OutgoingMessage};

use crate::command::CommandDescriptor;
use crate::transport::{Transport, TransportError};

/// One outbound call seen by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Send {
        channel_id: String,
        message: OutgoingMessage,
    },
    Edit {
        channel_id: String,
        message_id: String,
        message: OutgoingMessage,
    },
    Delete {
        channel_id: String,
        message_id: String,
    },
    AddReaction {
        channel_id: String,
        message_id: String,
        emoji: String,
    },
    RemoveReaction {
        channel_id: String,
        message_id: String,
        emoji: String,
    },
    Respond {
        interaction_id: String,
        reply: InteractionReply,
    },
    RegisterCommand {
        command: CommandDescriptor,
    },
}

/// Records every call. When built with [`RecordingTransport::failing`] every
/// call is still recorded but returns an error.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    channels: Mutex<HashMap<String, String>>,
    failure: Option<String>,
    next_message: AtomicU64,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_channel(self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.channels.lock().insert(name.into(), id.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn sent_messages(&self) -> Vec<(String, OutgoingMessage)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Send {
                    channel_id,
                    message,
                } => Some((channel_id.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<InteractionReply> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Respond { reply, .. } => Some(reply.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RecordedCall) -> Result<(), TransportError> {
        self.calls.lock().push(call);
        match &self.failure {
            Some(reason) => Err(TransportError::Request(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Transport for RecordingTransport {
    fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TransportError> {
        self.record(RecordedCall::Send {
            channel_id: channel_id.to_string(),
            message: message.clone(),
        })?;
        let n = self.next_message.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("m{}", n))
    }

    fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        self.record(RecordedCall::Edit {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            message: message.clone(),
        })
    }

    fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError> {
        self.record(RecordedCall::Delete {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        })
    }

    fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError> {
        self.record(RecordedCall::AddReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        })
    }

    fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError> {
        self.record(RecordedCall::RemoveReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        })
    }

    fn respond_to_interaction(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), TransportError> {
        self.record(RecordedCall::Respond {
            interaction_id: interaction.id.clone(),
            reply: reply.clone(),
        })
    }

    fn register_command(&self, command: &CommandDescriptor) -> Result<(), TransportError> {
        self.record(RecordedCall::RegisterCommand {
            command: command.clone(),
        })
    }

    fn find_channel(&self, name: &str) -> Result<Option<String>, TransportError> {
        if let Some(reason) = &self.failure {
            return Err(TransportError::Request(reason.clone()));
        }
        Ok(self.channels.lock().get(name).cloned())
    }
}
