use mlua::{Function, Lua};

use crate::command::OptionKind;
use crate::registry::Binding;

/// `option.new_string(name, description[, required])` and friends. Each
/// returns an option table ready for a command's `options` list.
pub struct NewOption {
    kind: OptionKind,
}

impl NewOption {
    pub fn new(kind: OptionKind) -> Self {
        Self { kind }
    }

    /// One constructor per leaf option kind
    pub fn all() -> Vec<Self> {
        OptionKind::ALL
            .into_iter()
            .filter(|kind| !matches!(kind, OptionKind::SubCommand | OptionKind::SubCommandGroup))
            .map(Self::new)
            .collect()
    }
}

impl Binding for NewOption {
    fn name(&self) -> &'static str {
        match self.kind {
            OptionKind::String => "new_string",
            OptionKind::Integer => "new_integer",
            OptionKind::Boolean => "new_bool",
            OptionKind::User => "new_user",
            OptionKind::Channel => "new_channel",
            OptionKind::Role => "new_role",
            OptionKind::Mentionable => "new_mentionable",
            OptionKind::Number => "new_number",
            OptionKind::Attachment => "new_attachment",
            OptionKind::SubCommand => "new_subcommand",
            OptionKind::SubCommandGroup => "new_subcommand_group",
        }
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let code = self.kind.code();
        lua.create_function(
            move |lua, (name, description, required): (String, String, Option<bool>)| {
                let option = lua.create_table()?;
                option.set("name", name)?;
                option.set("description", description)?;
                option.set("type", code)?;
                option.set("required", required.unwrap_or(false))?;
                Ok(option)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::commands::parse_command;
    use mlua::Table;

    #[test]
    fn test_constructed_options_parse() {
        let lua = Lua::new();
        let option = lua.create_table().unwrap();
        for binding in NewOption::all() {
            option
                .set(binding.name(), binding.register(&lua).unwrap())
                .unwrap();
        }
        lua.globals().set("option", option).unwrap();

        let def: Table = lua
            .load(
                r#"return {
                    name = "roll",
                    handler = function() end,
                    options = { option.new_integer("sides", "Sides", true), option.new_bool("loud", "Shout") },
                }"#,
            )
            .eval()
            .unwrap();

        let cmd = parse_command(&def).unwrap();
        assert_eq!(cmd.options[0].kind, OptionKind::Integer);
        assert!(cmd.options[0].required);
        assert_eq!(cmd.options[1].kind, OptionKind::Boolean);
        assert!(!cmd.options[1].required);
    }
}
