use mlua::{Function, IntoLuaMulti, Lua, Table};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const HANDLER_TABLE: &str = "tidepool.handlers";

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to a script function held by the VM
///
/// The function itself never leaves the engine thread. Routers and the
/// scheduler keep only this id and ask the engine to call it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerRef(String);

impl HandlerRef {
    /// A reference with a caller-chosen id, e.g. `settings_theme`
    pub fn scoped(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh reference that cannot collide with any other
    pub fn unique(prefix: &str) -> Self {
        let n = NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}#{}", prefix, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn handler_table(lua: &Lua) -> mlua::Result<Table> {
    if let Ok(table) = lua.named_registry_value::<Table>(HANDLER_TABLE) {
        return Ok(table);
    }
    let table = lua.create_table()?;
    lua.set_named_registry_value(HANDLER_TABLE, table.clone())?;
    Ok(table)
}

/// Store `func` under `handler`, replacing whatever was there
pub fn bind(lua: &Lua, handler: &HandlerRef, func: Function) -> mlua::Result<()> {
    handler_table(lua)?.raw_set(handler.as_str(), func)
}

/// Forget `handler`. Releasing an unbound handler is a no-op.
pub fn release(lua: &Lua, handler: &HandlerRef) -> mlua::Result<()> {
    handler_table(lua)?.raw_set(handler.as_str(), mlua::Nil)
}

pub fn is_bound(lua: &Lua, handler: &HandlerRef) -> mlua::Result<bool> {
    let value: mlua::Value = handler_table(lua)?.raw_get(handler.as_str())?;
    Ok(matches!(value, mlua::Value::Function(_)))
}

/// Call the function bound to `handler`; return values are discarded
pub fn call(lua: &Lua, handler: &HandlerRef, args: impl IntoLuaMulti) -> mlua::Result<()> {
    let func: Option<Function> = handler_table(lua)?.raw_get(handler.as_str())?;
    match func {
        Some(func) => func.call::<()>(args),
        None => Err(mlua::Error::runtime(format!(
            "handler '{}' is not bound",
            handler
        ))),
    }
}
