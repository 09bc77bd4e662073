use mlua::{Function, Lua};
use std::sync::Arc;

use crate::handler::{self, HandlerRef};
use crate::interaction::InteractionRouter;
use crate::registry::Binding;

/// `register_interaction(custom_id, fn)` and
/// `register_interaction_pattern(pattern, fn)`
pub struct RegisterInteraction {
    router: Arc<InteractionRouter>,
    pattern: bool,
}

impl RegisterInteraction {
    pub fn literal(router: Arc<InteractionRouter>) -> Self {
        Self {
            router,
            pattern: false,
        }
    }

    pub fn pattern(router: Arc<InteractionRouter>) -> Self {
        Self {
            router,
            pattern: true,
        }
    }
}

impl Binding for RegisterInteraction {
    fn name(&self) -> &'static str {
        if self.pattern {
            "register_interaction_pattern"
        } else {
            "register_interaction"
        }
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let router = self.router.clone();
        let pattern = self.pattern;
        lua.create_function(move |lua, (key, func): (String, Function)| {
            let h = HandlerRef::unique("interaction");
            let replaced = if pattern {
                router.register_pattern(&key, h.clone())?
            } else {
                router.register_literal(&key, h.clone())
            };

            handler::bind(lua, &h, func)?;
            if let Some(old) = replaced {
                handler::release(lua, &old)?;
            }
            Ok(true)
        })
    }
}
