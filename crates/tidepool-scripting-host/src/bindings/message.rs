use mlua::{Function, Lua, Table, Value};
use std::sync::Arc;
use tidepool_events::OutgoingMessage;

use super::require_transport;
use crate::convert::{parse_components, parse_embed, transport_result};
use crate::registry::Binding;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOp {
    /// `add(channel_id, content[, opts])` returns the new message id
    Add,
    /// Same as `Add`
    Send,
    /// `edit(message_id, channel_id, content[, opts])`
    Edit,
    /// `delete(message_id, channel_id)`
    Delete,
}

/// The `message` group. Every call returns a value or `nil, err`.
pub struct MessageBinding {
    op: MessageOp,
    transport: Option<Arc<dyn Transport>>,
}

impl MessageBinding {
    pub fn new(op: MessageOp) -> Self {
        Self {
            op,
            transport: None,
        }
    }
}

impl Binding for MessageBinding {
    fn name(&self) -> &'static str {
        match self.op {
            MessageOp::Add => "add",
            MessageOp::Send => "send",
            MessageOp::Edit => "edit",
            MessageOp::Delete => "delete",
        }
    }

    fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let transport = require_transport(&self.transport, self.name())?;
        match self.op {
            MessageOp::Add | MessageOp::Send => lua.create_function(
                move |lua, (channel_id, content, opts): (String, String, Option<Table>)| {
                    let message = build_message(lua, content, opts.as_ref())?;
                    transport_result(lua, transport.send_message(&channel_id, &message))
                },
            ),
            MessageOp::Edit => lua.create_function(
                move |lua,
                      (message_id, channel_id, content, opts): (
                    String,
                    String,
                    String,
                    Option<Table>,
                )| {
                    let message = build_message(lua, content, opts.as_ref())?;
                    transport_result(
                        lua,
                        transport
                            .edit_message(&channel_id, &message_id, &message)
                            .map(|_| true),
                    )
                },
            ),
            MessageOp::Delete => {
                lua.create_function(move |lua, (message_id, channel_id): (String, String)| {
                    transport_result(
                        lua,
                        transport
                            .delete_message(&channel_id, &message_id)
                            .map(|_| true),
                    )
                })
            }
        }
    }
}

/// Content plus `{components, embed}` options
pub fn build_message(
    lua: &Lua,
    content: String,
    opts: Option<&Table>,
) -> mlua::Result<OutgoingMessage> {
    let mut message = OutgoingMessage::text(content);
    if let Some(opts) = opts {
        let components: Value = opts.get("components")?;
        message.components = parse_components(lua, Some(&components))?;
        if let Some(embed) = opts.get::<Option<Table>>("embed")? {
            let embed = parse_embed(&embed)?;
            if !embed.is_empty() {
                message.embed = Some(embed);
            }
        }
    }
    Ok(message)
}
