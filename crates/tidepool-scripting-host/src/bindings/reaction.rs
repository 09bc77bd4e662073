use mlua::{Function, Lua};
use std::sync::Arc;

use super::require_transport;
use crate::convert::transport_result;
use crate::registry::Binding;
use crate::transport::Transport;

/// `reaction.add(message_id, channel_id, emoji)` and `reaction.remove(...)`
pub struct ReactionBinding {
    remove: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl ReactionBinding {
    pub fn add() -> Self {
        Self {
            remove: false,
            transport: None,
        }
    }

    pub fn remove() -> Self {
        Self {
            remove: true,
            transport: None,
        }
    }
}

impl Binding for ReactionBinding {
    fn name(&self) -> &'static str {
        if self.remove {
            "remove"
        } else {
            "add"
        }
    }

    fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let transport = require_transport(&self.transport, self.name())?;
        let remove = self.remove;
        lua.create_function(
            move |lua, (message_id, channel_id, emoji): (String, String, String)| {
                let result = if remove {
                    transport.remove_reaction(&channel_id, &message_id, &emoji)
                } else {
                    transport.add_reaction(&channel_id, &message_id, &emoji)
                };
                transport_result(lua, result.map(|_| true))
            },
        )
    }
}
