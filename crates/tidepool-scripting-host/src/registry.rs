//! Capability registry: the host functions scripts reach through
//! `require("tidepool")`.

use mlua::{Function, Lua, MultiValue, Table};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::command::OptionKind;
use crate::error::RegistrationConflict;
use crate::transport::Transport;

/// Module name scripts pass to `require`
pub const MODULE_NAME: &str = "tidepool";

/// Group whose bindings sit at the top level of the module
pub const DEFAULT_GROUP: &str = "default";

const MODULE_KEY: &str = "tidepool.module";

/// A single named host function
pub trait Binding: Send + Sync {
    /// Name under which the function appears in its group
    fn name(&self) -> &'static str;

    /// Build the Lua function. Runs once, on the engine thread.
    fn register(&self, lua: &Lua) -> mlua::Result<Function>;

    /// Late-bind the outbound transport. Bindings that make no outbound
    /// calls ignore it.
    fn attach(&mut self, _transport: Arc<dyn Transport>) {}
}

/// Bindings grouped by module name, installed into the VM exactly once
#[derive(Default)]
pub struct CapabilityRegistry {
    groups: BTreeMap<String, Vec<Box<dyn Binding>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        group: &str,
        binding: impl Binding + 'static,
    ) -> Result<(), RegistrationConflict> {
        let bindings = self.groups.entry(group.to_string()).or_default();
        if bindings.iter().any(|b| b.name() == binding.name()) {
            return Err(RegistrationConflict::DuplicateBinding {
                group: group.to_string(),
                name: binding.name(),
            });
        }
        bindings.push(Box::new(binding));
        Ok(())
    }

    /// Give every binding the outbound transport
    pub fn attach(&mut self, transport: Arc<dyn Transport>) {
        for binding in self.groups.values_mut().flatten() {
            binding.attach(transport.clone());
        }
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn binding_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Build the module table and make it available to `require`.
    ///
    /// Fails if a registry was already installed into this VM or if a
    /// binding cannot be built.
    pub fn install(self, lua: &Lua) -> mlua::Result<()> {
        if lua.named_registry_value::<Option<Table>>(MODULE_KEY)?.is_some() {
            return Err(RegistrationConflict::AlreadyInstalled.into());
        }

        let module = lua.create_table()?;
        for (group, bindings) in &self.groups {
            let target = if group == DEFAULT_GROUP {
                module.clone()
            } else {
                let table = lua.create_table()?;
                module.set(group.as_str(), table.clone())?;
                table
            };

            for binding in bindings {
                target.set(binding.name(), binding.register(lua)?)?;
            }
        }

        for kind in OptionKind::ALL {
            module.set(kind.constant_name(), kind.code())?;
        }
        module.set("log", create_log_table(lua)?)?;

        lua.set_named_registry_value(MODULE_KEY, module.clone())?;

        let package: Table = lua.globals().get("package")?;
        let preload: Table = package.get("preload")?;
        preload.set(
            MODULE_NAME,
            lua.create_function(|lua, _: MultiValue| lua.named_registry_value::<Table>(MODULE_KEY))?,
        )?;

        debug!(
            target: "scripting",
            "Installed {} binding(s) in {} group(s)",
            self.binding_count(),
            self.groups.len()
        );
        Ok(())
    }
}

/// `log.debug/info/warn/error`, forwarded to tracing
fn create_log_table(lua: &Lua) -> mlua::Result<Table> {
    let log = lua.create_table()?;
    log.set(
        "debug",
        lua.create_function(|_, msg: String| {
            debug!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "info",
        lua.create_function(|_, msg: String| {
            info!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "warn",
        lua.create_function(|_, msg: String| {
            warn!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    log.set(
        "error",
        lua.create_function(|_, msg: String| {
            error!(target: "script", "{}", msg);
            Ok(())
        })?,
    )?;
    Ok(log)
}
