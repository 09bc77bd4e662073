use mlua::{Function, Lua, Table};
use std::sync::Arc;

use crate::command::{CommandDescriptor, CommandRouter, OptionDescriptor, OptionKind};
use crate::convert::transport_result;
use crate::error::{RegistrationConflict, ValidationError};
use crate::handler;
use crate::registry::Binding;

/// `register_application_command(def)`
///
/// Registers the command with the router, binds its handlers and publishes
/// it. A routing conflict raises an error; a failed publish returns
/// `nil, err`.
pub struct RegisterCommand {
    router: Arc<CommandRouter>,
}

impl RegisterCommand {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self { router }
    }
}

impl Binding for RegisterCommand {
    fn name(&self) -> &'static str {
        "register_application_command"
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let router = self.router.clone();
        lua.create_function(move |lua, def: Table| {
            let descriptor = parse_command(&def)?;

            let mut pending = Vec::new();
            let registered =
                router.register(descriptor, |h, func| pending.push((h.clone(), func)))?;
            for (h, func) in pending {
                handler::bind(lua, &h, func)?;
            }

            transport_result(lua, router.publish(&registered).map(|_| true))
        })
    }
}

fn required_string(table: &Table, key: &str, what: &str) -> mlua::Result<String> {
    match table.get::<Option<String>>(key)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ValidationError::new(format!("{} needs a '{}'", what, key)).into()),
    }
}

/// Read a command definition table
pub fn parse_command(def: &Table) -> mlua::Result<CommandDescriptor<Function>> {
    let name = required_string(def, "name", "command")?;
    let mut descriptor = CommandDescriptor::new(
        name.clone(),
        def.get::<Option<String>>("description")?.unwrap_or_default(),
    );
    descriptor.handler = def.get::<Option<Function>>("handler")?;
    descriptor.options = parse_options(def, &name)?;
    Ok(descriptor)
}

fn parse_options(parent: &Table, path: &str) -> mlua::Result<Vec<OptionDescriptor<Function>>> {
    let Some(list) = parent.get::<Option<Table>>("options")? else {
        return Ok(Vec::new());
    };

    let mut options = Vec::new();
    for entry in list.sequence_values::<Table>() {
        options.push(parse_option(&entry?, path)?);
    }
    Ok(options)
}

fn parse_option(table: &Table, parent: &str) -> mlua::Result<OptionDescriptor<Function>> {
    let name = required_string(table, "name", "option")?;
    let path = format!("{}_{}", parent, name);

    let code = table
        .get::<Option<i64>>("type")?
        .ok_or_else(|| ValidationError::new(format!("option '{}' needs a 'type'", path)))?;
    let kind = OptionKind::from_code(code).ok_or_else(|| RegistrationConflict::UnknownKind {
        path: path.clone(),
        code,
    })?;

    let mut option = OptionDescriptor::new(
        name,
        table.get::<Option<String>>("description")?.unwrap_or_default(),
        kind,
    )
    .required(table.get::<Option<bool>>("required")?.unwrap_or(false));
    option.handler = table.get::<Option<Function>>("handler")?;
    option.children = parse_options(table, &path)?;
    Ok(option)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_definition() {
        let lua = Lua::new();
        let def: Table = lua
            .load(
                r#"return {
                    name = "settings",
                    description = "Change settings",
                    options = {
                        {
                            name = "theme", description = "Theme", type = 1,
                            handler = function(ctx) end,
                            options = { { name = "color", description = "Color", type = 3, required = true } },
                        },
                    },
                }"#,
            )
            .eval()
            .unwrap();

        let cmd = parse_command(&def).unwrap();
        assert_eq!(cmd.name, "settings");
        assert!(cmd.handler.is_none());
        assert_eq!(cmd.options[0].kind, OptionKind::SubCommand);
        assert!(cmd.options[0].handler.is_some());
        assert_eq!(cmd.options[0].children[0].kind, OptionKind::String);
        assert!(cmd.options[0].children[0].required);
    }

    #[test]
    fn test_unknown_kind() {
        let lua = Lua::new();
        let def: Table = lua
            .load(r#"return { name = "x", options = { { name = "bad", type = 99 } } }"#)
            .eval()
            .unwrap();
        let err = parse_command(&def).unwrap_err();
        assert!(err.to_string().contains("unknown kind 99"));
    }

    #[test]
    fn test_missing_name() {
        let lua = Lua::new();
        let def: Table = lua.load("return { description = 'no name' }").eval().unwrap();
        assert!(parse_command(&def).is_err());
    }
}
