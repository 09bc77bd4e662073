use mlua::{Function, Lua, LuaSerdeExt, Table};
use tidepool_events::{ButtonStyle, Component, SelectOption};

use crate::convert::component_to_lua;
use crate::error::ValidationError;
use crate::registry::Binding;

/// `new_button(label, custom_id[, style])`
pub struct NewButton;

impl Binding for NewButton {
    fn name(&self) -> &'static str {
        "new_button"
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.create_function(
            |lua, (label, custom_id, style): (String, String, Option<String>)| {
                let style = match style {
                    Some(name) => ButtonStyle::parse(&name).ok_or_else(|| {
                        ValidationError::new(format!("unknown button style '{}'", name))
                    })?,
                    None => ButtonStyle::default(),
                };
                component_to_lua(
                    lua,
                    &Component::Button {
                        label,
                        custom_id,
                        style,
                    },
                )
            },
        )
    }
}

/// `new_selectmenu(placeholder, custom_id, options[, disabled])`
pub struct NewSelectMenu;

impl Binding for NewSelectMenu {
    fn name(&self) -> &'static str {
        "new_selectmenu"
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.create_function(
            |lua, (placeholder, custom_id, options, disabled): (String, String, Table, Option<bool>)| {
                let options = options
                    .sequence_values::<mlua::Value>()
                    .map(|v| lua.from_value::<SelectOption>(v?))
                    .collect::<mlua::Result<Vec<_>>>()?;
                if options.is_empty() {
                    return Err(ValidationError::new("select menu needs at least one option").into());
                }

                component_to_lua(
                    lua,
                    &Component::Select {
                        placeholder,
                        custom_id,
                        options,
                        disabled: disabled.unwrap_or(false),
                    },
                )
            },
        )
    }
}

/// `new_selectmenu_opt(label, value)`
pub struct NewSelectOption;

impl Binding for NewSelectOption {
    fn name(&self) -> &'static str {
        "new_selectmenu_opt"
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.create_function(|lua, (label, value): (String, String)| {
            lua.to_value(&SelectOption { label, value })
        })
    }
}
