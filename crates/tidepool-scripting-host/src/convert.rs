//! Conversions between Lua values and the payload types in `tidepool_events`.

use mlua::{IntoLuaMulti, Lua, LuaSerdeExt, MultiValue, Table, Value};
use tidepool_events::{Component, Embed, EmbedAuthor, EmbedField, EmbedFooter, OptionValue};

use crate::error::ValidationError;
use crate::transport::TransportError;

/// Turn an outbound result into the `value` / `nil, err` pair scripts expect
pub fn transport_result<T: mlua::IntoLua>(
    lua: &Lua,
    result: Result<T, TransportError>,
) -> mlua::Result<MultiValue> {
    match result {
        Ok(value) => value.into_lua_multi(lua),
        Err(e) => (Value::Nil, e.to_string()).into_lua_multi(lua),
    }
}

/// Drop a leading `self` table so both `ctx:reply(..)` and `ctx.reply(..)` work
pub fn strip_self(args: MultiValue) -> Vec<Value> {
    let mut args: Vec<Value> = args.into_iter().collect();
    if matches!(args.first(), Some(Value::Table(_))) {
        args.remove(0);
    }
    args
}

pub fn string_arg(value: Option<&Value>, what: &str) -> Result<String, ValidationError> {
    match value {
        Some(Value::String(s)) => Ok(s.to_str().map_err(|_| not_utf8(what))?.to_string()),
        Some(Value::Integer(n)) => Ok(n.to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ValidationError::new(format!("{} must be a string", what))),
    }
}

pub fn optional_table(value: Option<&Value>, what: &str) -> Result<Option<Table>, ValidationError> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Table(t)) => Ok(Some(t.clone())),
        _ => Err(ValidationError::new(format!("{} must be a table", what))),
    }
}

fn not_utf8(what: &str) -> ValidationError {
    ValidationError::new(format!("{} is not valid UTF-8", what))
}

fn opt_string(table: &Table, key: &str) -> mlua::Result<Option<String>> {
    table.get::<Option<String>>(key)
}

/// `{url = "..."}` or a bare string
fn url_field(table: &Table, key: &str) -> mlua::Result<Option<String>> {
    match table.get::<Value>(key)? {
        Value::Table(inner) => opt_string(&inner, "url"),
        Value::String(s) => Ok(Some(s.to_str()?.to_string())),
        _ => Ok(None),
    }
}

/// Read an embed table. Unknown keys are ignored.
pub fn parse_embed(table: &Table) -> mlua::Result<Embed> {
    let footer = match table.get::<Option<Table>>("footer")? {
        Some(t) => Some(EmbedFooter {
            text: opt_string(&t, "text")?.unwrap_or_default(),
            icon_url: opt_string(&t, "icon_url")?,
        }),
        None => None,
    };

    let author = match table.get::<Option<Table>>("author")? {
        Some(t) => Some(EmbedAuthor {
            name: opt_string(&t, "name")?.unwrap_or_default(),
            url: opt_string(&t, "url")?,
            icon_url: opt_string(&t, "icon_url")?,
        }),
        None => None,
    };

    let mut fields = Vec::new();
    if let Some(list) = table.get::<Option<Table>>("fields")? {
        for field in list.sequence_values::<Table>() {
            let field = field?;
            fields.push(EmbedField {
                name: opt_string(&field, "name")?.unwrap_or_default(),
                value: opt_string(&field, "value")?.unwrap_or_default(),
                inline: field.get::<Option<bool>>("inline")?.unwrap_or(false),
            });
        }
    }

    Ok(Embed {
        title: opt_string(table, "title")?,
        description: opt_string(table, "description")?,
        url: opt_string(table, "url")?,
        color: table.get::<Option<u32>>("color")?,
        image: url_field(table, "image")?,
        thumbnail: url_field(table, "thumbnail")?,
        footer,
        author,
        fields,
    })
}

/// Read a list of component tables as built by `new_button` / `new_selectmenu`
pub fn parse_components(lua: &Lua, value: Option<&Value>) -> mlua::Result<Vec<Component>> {
    let list = match value {
        None | Some(Value::Nil) => return Ok(Vec::new()),
        Some(Value::Table(t)) => t.clone(),
        Some(_) => return Err(ValidationError::new("components must be a table").into()),
    };

    // A single component passed without a wrapping list
    if list.contains_key("type")? {
        return Ok(vec![lua.from_value(Value::Table(list))?]);
    }

    list.sequence_values::<Value>()
        .map(|v| lua.from_value::<Component>(v?))
        .collect()
}

pub fn component_to_lua(lua: &Lua, component: &Component) -> mlua::Result<Value> {
    lua.to_value(component)
}

pub fn option_value_to_lua(lua: &Lua, value: &OptionValue) -> mlua::Result<Value> {
    Ok(match value {
        OptionValue::String(s)
        | OptionValue::User(s)
        | OptionValue::Channel(s)
        | OptionValue::Role(s)
        | OptionValue::Mentionable(s)
        | OptionValue::Attachment(s) => Value::String(lua.create_string(s)?),
        OptionValue::Integer(n) => Value::Integer(*n),
        OptionValue::Boolean(b) => Value::Boolean(*b),
        OptionValue::Number(n) => Value::Number(*n),
        OptionValue::SubCommand(children) | OptionValue::SubCommandGroup(children) => {
            let table = lua.create_table()?;
            for child in children {
                table.set(child.name.as_str(), option_value_to_lua(lua, &child.value)?)?;
            }
            Value::Table(table)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidepool_events::ButtonStyle;

    #[test]
    fn test_parse_embed() {
        let lua = Lua::new();
        let table: Table = lua
            .load(
                r#"return {
                    title = "Hello",
                    color = 255,
                    image = { url = "https://img" },
                    footer = { text = "foot" },
                    fields = { { name = "a", value = "1", inline = true }, { name = "b", value = "2" } },
                }"#,
            )
            .eval()
            .unwrap();

        let embed = parse_embed(&table).unwrap();
        assert_eq!(embed.title.as_deref(), Some("Hello"));
        assert_eq!(embed.color, Some(255));
        assert_eq!(embed.image.as_deref(), Some("https://img"));
        assert_eq!(embed.footer.unwrap().text, "foot");
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields[0].inline);
        assert!(!embed.fields[1].inline);
    }

    #[test]
    fn test_components_round_trip_through_lua() {
        let lua = Lua::new();
        let button = Component::Button {
            label: "OK".into(),
            custom_id: "confirm".into(),
            style: ButtonStyle::Success,
        };
        let value = component_to_lua(&lua, &button).unwrap();
        let list = lua.create_sequence_from([value]).unwrap();

        let parsed = parse_components(&lua, Some(&Value::Table(list))).unwrap();
        assert_eq!(parsed, vec![button]);
    }

    #[test]
    fn test_strip_self() {
        let lua = Lua::new();
        let ctx = lua.create_table().unwrap();
        let args = (ctx, "hi").into_lua_multi(&lua).unwrap();
        let rest = strip_self(args);
        assert_eq!(rest.len(), 1);
        assert_eq!(string_arg(rest.first(), "content").unwrap(), "hi");
    }

    #[test]
    fn test_transport_result_error_pair() {
        let lua = Lua::new();
        let out = transport_result::<bool>(&lua, Err(TransportError::Timeout)).unwrap();
        let values: Vec<Value> = out.into_iter().collect();
        assert!(values[0].is_nil());
        assert_eq!(
            values[1].as_str().map(|s| s.to_string()),
            Some("request timed out".to_string())
        );
    }
}
