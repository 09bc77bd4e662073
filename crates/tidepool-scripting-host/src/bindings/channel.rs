use mlua::{Function, Lua};
use std::sync::Arc;

use super::require_transport;
use crate::convert::transport_result;
use crate::registry::Binding;
use crate::transport::Transport;

/// `channel.get(name)`: the channel id, or nil if no channel has that name
#[derive(Default)]
pub struct ChannelGet {
    transport: Option<Arc<dyn Transport>>,
}

impl Binding for ChannelGet {
    fn name(&self) -> &'static str {
        "get"
    }

    fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let transport = require_transport(&self.transport, "channel.get")?;
        lua.create_function(move |lua, name: String| {
            transport_result(lua, transport.find_channel(&name))
        })
    }
}
