use serenity::all::{ChannelId, GuildId, InteractionId, MessageId, ReactionType};
use serenity::builder::Builder;
use serenity::http::Http;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tidepool_events::{InteractionRef, InteractionReply, OutgoingMessage};
use tidepool_scripting_host::{CommandDescriptor, Transport, TransportError};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::convert::{create_command, create_message, edit_message, interaction_response};

/// Outbound calls over Discord's HTTP API
///
/// Scripts run on the engine thread, outside the async runtime, so each call
/// is driven to completion on `runtime` and bounded by `timeout`.
pub struct SerenityTransport {
    http: Arc<Http>,
    runtime: Handle,
    guild_id: GuildId,
    timeout: Duration,
}

impl SerenityTransport {
    /// `guild_id` must be non-zero
    pub fn new(http: Arc<Http>, runtime: Handle, guild_id: u64, timeout: Duration) -> Self {
        Self {
            http,
            runtime,
            guild_id: GuildId::new(guild_id),
            timeout,
        }
    }

    fn block<T, F>(&self, what: &str, request: F) -> Result<T, TransportError>
    where
        F: Future<Output = serenity::Result<T>>,
    {
        match self
            .runtime
            .block_on(tokio::time::timeout(self.timeout, request))
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(target: "discord", "{} failed: {}", what, e);
                Err(TransportError::Request(e.to_string()))
            }
            Err(_) => {
                warn!(target: "discord", "{} timed out after {:?}", what, self.timeout);
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Discord ids are non-zero integers; the id constructors panic on zero
fn snowflake(what: &'static str, value: &str) -> Result<u64, TransportError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| TransportError::InvalidId {
            what,
            value: value.to_string(),
        })
}

fn channel(value: &str) -> Result<ChannelId, TransportError> {
    snowflake("channel id", value).map(ChannelId::new)
}

fn message(value: &str) -> Result<MessageId, TransportError> {
    snowflake("message id", value).map(MessageId::new)
}

fn reaction(emoji: &str) -> Result<ReactionType, TransportError> {
    ReactionType::try_from(emoji).map_err(|_| TransportError::InvalidId {
        what: "emoji",
        value: emoji.to_string(),
    })
}

impl Transport for SerenityTransport {
    fn send_message(
        &self,
        channel_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<String, TransportError> {
        let channel = channel(channel_id)?;
        let sent = self.block(
            "send_message",
            channel.send_message(&self.http, create_message(outgoing)),
        )?;
        debug!(target: "discord", "Sent message {} to {}", sent.id, channel);
        Ok(sent.id.to_string())
    }

    fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let channel = channel(channel_id)?;
        let message = message(message_id)?;
        self.block(
            "edit_message",
            channel.edit_message(&self.http, message, edit_message(outgoing)),
        )
        .map(|_| ())
    }

    fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError> {
        let channel = channel(channel_id)?;
        let message = message(message_id)?;
        self.block("delete_message", channel.delete_message(&self.http, message))
    }

    fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let channel = channel(channel_id)?;
        let message = message(message_id)?;
        let emoji = reaction(emoji)?;
        self.block(
            "add_reaction",
            channel.create_reaction(&self.http, message, emoji),
        )
    }

    fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let channel = channel(channel_id)?;
        let message = message(message_id)?;
        let emoji = reaction(emoji)?;
        // Only the bot's own reaction
        self.block(
            "remove_reaction",
            channel.delete_reaction(&self.http, message, None, emoji),
        )
    }

    fn respond_to_interaction(
        &self,
        interaction: &InteractionRef,
        reply: &InteractionReply,
    ) -> Result<(), TransportError> {
        let id = InteractionId::new(snowflake("interaction id", &interaction.id)?);
        self.block(
            "respond_to_interaction",
            interaction_response(reply).execute(&self.http, (id, interaction.token.as_str())),
        )
    }

    fn register_command(&self, command: &CommandDescriptor) -> Result<(), TransportError> {
        let created = self.block(
            "register_command",
            self.guild_id.create_command(&self.http, create_command(command)),
        )?;
        debug!(target: "discord", "Registered /{} in guild {} as {}", command.name, self.guild_id, created.id);
        Ok(())
    }

    fn find_channel(&self, name: &str) -> Result<Option<String>, TransportError> {
        let wanted = name.trim_start_matches('#');
        let channels = self.block("find_channel", self.guild_id.channels(&self.http))?;
        Ok(channels
            .into_iter()
            .find(|(_, channel)| channel.name == wanted)
            .map(|(id, _)| id.to_string()))
    }
}
