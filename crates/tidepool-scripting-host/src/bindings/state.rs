use mlua::{DeserializeOptions, Function, Lua, LuaSerdeExt, SerializeOptions, Value};
use std::sync::Arc;

use crate::error::ValidationError;
use crate::registry::Binding;
use crate::state::{ttl_from_secs, StateStore};

/// Values kept in the shared store. Only plain data survives the trip out of
/// the VM: functions, userdata and threads are rejected.
pub type StateValue = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    Get,
    Set,
    Clear,
}

/// `state.get(key)`, `state.set(key, value[, ttl])`, `state.clear(key)`
pub struct StateBinding {
    op: StateOp,
    store: Arc<StateStore<StateValue>>,
}

impl StateBinding {
    pub fn new(op: StateOp, store: Arc<StateStore<StateValue>>) -> Self {
        Self { op, store }
    }
}

impl Binding for StateBinding {
    fn name(&self) -> &'static str {
        match self.op {
            StateOp::Get => "get",
            StateOp::Set => "set",
            StateOp::Clear => "clear",
        }
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let store = self.store.clone();
        match self.op {
            StateOp::Get => lua.create_function(move |lua, key: String| match store.get(&key) {
                Some(value) => to_lua(lua, &value),
                None => Ok(Value::Nil),
            }),
            StateOp::Set => lua.create_function(
                move |lua, (key, value, ttl): (String, Value, Option<f64>)| {
                    if value.is_nil() {
                        store.clear(&key);
                        return Ok(());
                    }
                    let ttl = ttl_from_secs(ttl.unwrap_or(0.0))?;
                    let value = from_lua(lua, value)?;
                    store.set(key, value, ttl);
                    Ok(())
                },
            ),
            StateOp::Clear => lua.create_function(move |_, key: String| {
                store.clear(&key);
                Ok(())
            }),
        }
    }
}

/// Nesting depth searched for a value that cannot be stored
const MAX_CHECK_DEPTH: usize = 32;

/// Type name of the first value inside `value` that has no plain-data form
fn unstorable_type(value: &Value, depth: usize) -> mlua::Result<Option<&'static str>> {
    match value {
        Value::Nil | Value::Boolean(_) | Value::Integer(_) | Value::Number(_) | Value::String(_) => {
            Ok(None)
        }
        Value::LightUserData(ud) if ud.0.is_null() => Ok(None),
        Value::Table(table) if depth < MAX_CHECK_DEPTH => {
            for pair in table.pairs::<Value, Value>() {
                let (key, value) = pair?;
                if let Some(name) = unstorable_type(&key, depth + 1)? {
                    return Ok(Some(name));
                }
                if let Some(name) = unstorable_type(&value, depth + 1)? {
                    return Ok(Some(name));
                }
            }
            Ok(None)
        }
        Value::Table(_) => Ok(None),
        other => Ok(Some(other.type_name())),
    }
}

fn from_lua(lua: &Lua, value: Value) -> mlua::Result<StateValue> {
    if let Some(name) = unstorable_type(&value, 0)? {
        return Err(ValidationError::new(format!(
            "state value is not storable: {} values cannot be kept in state",
            name
        ))
        .into());
    }

    let options = DeserializeOptions::new().deny_unsupported_types(true);
    lua.from_value_with(value, options)
        .map_err(|e| ValidationError::new(format!("state value is not storable: {}", e)).into())
}

fn to_lua(lua: &Lua, value: &StateValue) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}
