use mlua::{Lua, MultiValue, Table, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tidepool_events::{InteractionRef, InteractionReply, OptionValue};

use crate::convert::{
    option_value_to_lua, optional_table, parse_components, parse_embed, strip_self, string_arg,
    transport_result,
};
use crate::error::ValidationError;
use crate::transport::Transport;

/// Everything a handler sees about the event that triggered it
///
/// Built on the dispatching thread and turned into a Lua table on the engine
/// thread. The table carries `reply` and `reply_with_action` functions bound
/// to this particular interaction.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub interaction: InteractionRef,
    pub command: Option<String>,
    pub custom_id: Option<String>,
    pub options: BTreeMap<String, OptionValue>,
    /// Named captures from a pattern route
    pub data: BTreeMap<String, String>,
    /// Select menu choices
    pub values: Vec<String>,
    /// Modal inputs
    pub fields: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn command(
        interaction: InteractionRef,
        name: String,
        options: BTreeMap<String, OptionValue>,
    ) -> Self {
        Self {
            interaction,
            command: Some(name),
            options,
            ..Default::default()
        }
    }

    pub fn interaction(
        interaction: InteractionRef,
        custom_id: String,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            interaction,
            custom_id: Some(custom_id),
            data,
            ..Default::default()
        }
    }

    pub fn into_table(self, lua: &Lua, transport: Arc<dyn Transport>) -> mlua::Result<Table> {
        let ctx = lua.create_table()?;
        let interaction = self.interaction;

        ctx.set("interaction_id", interaction.id.as_str())?;
        ctx.set("channel_id", interaction.channel_id.as_str())?;

        let user = lua.create_table()?;
        user.set("id", interaction.user.id.as_str())?;
        user.set("username", interaction.user.username.as_str())?;
        user.set("global_name", interaction.user.global_name.clone())?;
        user.set("discriminator", interaction.user.discriminator.clone())?;
        user.set("avatar", interaction.user.avatar.clone())?;
        ctx.set("user", user)?;

        if let Some(command) = self.command {
            ctx.set("command", command)?;
            let options = lua.create_table()?;
            for (name, value) in &self.options {
                options.set(name.as_str(), option_value_to_lua(lua, value)?)?;
            }
            ctx.set("options", options)?;
        }

        if let Some(custom_id) = self.custom_id {
            ctx.set("custom_id", custom_id)?;
            ctx.set("data", lua.create_table_from(self.data)?)?;
            ctx.set("values", lua.create_sequence_from(self.values)?)?;
            ctx.set("fields", lua.create_table_from(self.fields)?)?;
        }

        let reply_target = interaction.clone();
        let reply_transport = transport.clone();
        let reply = lua.create_function(move |lua, args: MultiValue| {
            let args = strip_self(args);
            let content = string_arg(args.first(), "reply content")?;
            let opts = optional_table(args.get(1), "reply options")?;

            let reply = build_reply(&reply_target, content, opts.as_ref())?;
            transport_result(
                lua,
                reply_transport
                    .respond_to_interaction(&reply_target, &reply)
                    .map(|_| true),
            )
        })?;
        ctx.set("reply", reply)?;

        let action_target = interaction;
        let reply_with_action = lua.create_function(move |lua, args: MultiValue| {
            let args = strip_self(args);
            let content = string_arg(args.first(), "reply content")?;
            let components = parse_components(lua, args.get(1))?;
            let opts = optional_table(args.get(2), "reply options")?;

            let mut reply = build_reply(&action_target, content, opts.as_ref())?;
            reply.components = components;
            transport_result(
                lua,
                transport
                    .respond_to_interaction(&action_target, &reply)
                    .map(|_| true),
            )
        })?;
        ctx.set("reply_with_action", reply_with_action)?;

        Ok(ctx)
    }
}

/// Apply `{ephemeral, mention, embed}` options. Replies mention the invoking
/// user unless `mention = false`.
fn build_reply(
    interaction: &InteractionRef,
    content: String,
    opts: Option<&Table>,
) -> mlua::Result<InteractionReply> {
    let mut reply = InteractionReply::text(content);
    let mut mention = true;

    if let Some(opts) = opts {
        reply.ephemeral = bool_option(opts, "ephemeral", false)?;
        mention = bool_option(opts, "mention", true)?;
        if let Some(embed) = opts.get::<Option<Table>>("embed")? {
            let embed = parse_embed(&embed)?;
            if !embed.is_empty() {
                reply.embeds.push(embed);
            }
        }
    }

    if mention && !interaction.user.id.is_empty() {
        reply.content = format!("{} {}", interaction.user.mention(), reply.content);
    }

    Ok(reply)
}

fn bool_option(opts: &Table, key: &str, default: bool) -> mlua::Result<bool> {
    match opts.get::<Value>(key)? {
        Value::Nil => Ok(default),
        Value::Boolean(b) => Ok(b),
        other => Err(ValidationError::new(format!(
            "reply option '{}' must be a boolean, got {}",
            key,
            other.type_name()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordedCall, RecordingTransport};
    use tidepool_events::UserInfo;

    fn interaction() -> InteractionRef {
        InteractionRef::new("i1", "tok")
            .with_channel("C1")
            .with_user(UserInfo::new("42", "sam"))
    }

    fn run(script: &str, ctx: InvocationContext, transport: Arc<RecordingTransport>) -> Lua {
        let lua = Lua::new();
        let table = ctx.into_table(&lua, transport).unwrap();
        lua.globals().set("ctx", table).unwrap();
        lua.load(script).exec().unwrap();
        lua
    }

    #[test]
    fn test_reply_mentions_by_default() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = InvocationContext::command(interaction(), "ping".into(), BTreeMap::new());
        let lua = run("ok = ctx:reply('pong')", ctx, transport.clone());

        assert!(lua.globals().get::<bool>("ok").unwrap());
        match &transport.calls()[0] {
            RecordedCall::Respond { interaction_id, reply } => {
                assert_eq!(interaction_id, "i1");
                assert_eq!(reply.content, "<@42> pong");
                assert!(!reply.ephemeral);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_reply_dot_syntax_and_options() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = InvocationContext::command(interaction(), "ping".into(), BTreeMap::new());
        run(
            "ctx.reply('quiet', { ephemeral = true, mention = false, embed = { title = 'T' } })",
            ctx,
            transport.clone(),
        );

        let RecordedCall::Respond { reply, .. } = &transport.calls()[0] else {
            panic!("expected a response");
        };
        assert_eq!(reply.content, "quiet");
        assert!(reply.ephemeral);
        assert_eq!(reply.embeds[0].title.as_deref(), Some("T"));
    }

    #[test]
    fn test_reply_rejects_non_boolean_flags() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = InvocationContext::command(interaction(), "ping".into(), BTreeMap::new());
        let lua = run(
            r#"
            ok, err = pcall(ctx.reply, ctx, 'quiet', { ephemeral = "no" })
            err = tostring(err)
            "#,
            ctx,
            transport.clone(),
        );

        assert!(!lua.globals().get::<bool>("ok").unwrap());
        let err: String = lua.globals().get("err").unwrap();
        assert!(err.contains("'ephemeral' must be a boolean, got string"), "{}", err);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_reply_failure_is_a_value() {
        let transport = Arc::new(RecordingTransport::failing("offline"));
        let ctx = InvocationContext::command(interaction(), "ping".into(), BTreeMap::new());
        let lua = run("ok, err = ctx:reply('pong')", ctx, transport);

        assert!(lua.globals().get::<Option<bool>>("ok").unwrap().is_none());
        let err: String = lua.globals().get("err").unwrap();
        assert!(err.contains("offline"));
    }

    #[test]
    fn test_interaction_fields() {
        let transport = Arc::new(RecordingTransport::new());
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), "42".to_string());
        let ctx = InvocationContext::interaction(interaction(), "item_42".into(), data);
        let lua = run(
            "seen = ctx.custom_id .. ':' .. ctx.data.id .. ':' .. ctx.user.username",
            ctx,
            transport,
        );
        let seen: String = lua.globals().get("seen").unwrap();
        assert_eq!(seen, "item_42:42:sam");
    }
}
