use mlua::{MultiValue, Value};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tidepool_events::{ComponentInteraction, InteractionRef, ModalSubmit};
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::engine::EngineHandle;
use crate::error::{DispatchError, RegistrationConflict};
use crate::handler::HandlerRef;
use crate::transport::Transport;

struct PatternRoute {
    regex: Regex,
    handler: HandlerRef,
}

#[derive(Default)]
struct RouteTable {
    literals: HashMap<String, HandlerRef>,
    /// Tried in registration order
    patterns: Vec<PatternRoute>,
}

/// A matched interaction route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInteraction {
    pub handler: HandlerRef,
    /// Named captures that took part in the match; empty for literal routes
    pub data: BTreeMap<String, String>,
}

/// Routes component and modal interactions by custom id
///
/// Literal ids are always checked before patterns. Registering the same
/// literal or the same pattern source again replaces the earlier route and
/// returns the replaced handler so the caller can release it.
pub struct InteractionRouter {
    engine: EngineHandle,
    transport: Arc<dyn Transport>,
    routes: RwLock<RouteTable>,
}

impl InteractionRouter {
    pub fn new(engine: EngineHandle, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            transport,
            routes: RwLock::new(RouteTable::default()),
        }
    }

    pub fn register_literal(&self, custom_id: &str, handler: HandlerRef) -> Option<HandlerRef> {
        let replaced = self
            .routes
            .write()
            .literals
            .insert(custom_id.to_string(), handler);

        if replaced.is_some() {
            warn!(target: "scripting", "Interaction '{}' registered twice; keeping the newer handler", custom_id);
        } else {
            info!(target: "scripting", "Registered interaction '{}'", custom_id);
        }
        replaced
    }

    /// Compile `pattern` and add it after every existing pattern route
    pub fn register_pattern(
        &self,
        pattern: &str,
        handler: HandlerRef,
    ) -> Result<Option<HandlerRef>, RegistrationConflict> {
        let regex = Regex::new(pattern).map_err(|e| RegistrationConflict::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut routes = self.routes.write();
        if let Some(existing) = routes
            .patterns
            .iter_mut()
            .find(|route| route.regex.as_str() == pattern)
        {
            warn!(target: "scripting", "Interaction pattern '{}' registered twice; keeping the newer handler", pattern);
            return Ok(Some(std::mem::replace(&mut existing.handler, handler)));
        }

        routes.patterns.push(PatternRoute { regex, handler });
        info!(target: "scripting", "Registered interaction pattern '{}'", pattern);
        Ok(None)
    }

    pub fn resolve(&self, custom_id: &str) -> Result<ResolvedInteraction, DispatchError> {
        let routes = self.routes.read();

        if let Some(handler) = routes.literals.get(custom_id) {
            return Ok(ResolvedInteraction {
                handler: handler.clone(),
                data: BTreeMap::new(),
            });
        }

        for route in &routes.patterns {
            let Some(captures) = route.regex.captures(custom_id) else {
                continue;
            };

            let data = route
                .regex
                .capture_names()
                .flatten()
                .map(|name| {
                    // Optional groups that did not match still show up, empty
                    let value = captures.name(name).map_or("", |m| m.as_str());
                    (name.to_string(), value.to_string())
                })
                .collect();

            return Ok(ResolvedInteraction {
                handler: route.handler.clone(),
                data,
            });
        }

        Err(DispatchError::Miss {
            kind: "interaction",
            key: custom_id.to_string(),
        })
    }

    /// Route a button press or select menu choice and block until handled
    pub fn dispatch_component(&self, event: &ComponentInteraction) -> Result<(), DispatchError> {
        let (handler, mut ctx) = self.context_for(&event.interaction, &event.custom_id)?;
        ctx.values = event.values.clone();
        self.run(&handler, ctx)
    }

    /// Route a modal submission and block until handled
    pub fn dispatch_modal(&self, event: &ModalSubmit) -> Result<(), DispatchError> {
        let (handler, mut ctx) = self.context_for(&event.interaction, &event.custom_id)?;
        ctx.fields = event.fields.clone();
        self.run(&handler, ctx)
    }

    fn context_for(
        &self,
        interaction: &InteractionRef,
        custom_id: &str,
    ) -> Result<(HandlerRef, InvocationContext), DispatchError> {
        let resolved = match self.resolve(custom_id) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(target: "scripting", "Unhandled interaction: {}", e);
                return Err(e);
            }
        };

        debug!(target: "scripting", "Dispatching interaction '{}' to '{}'", custom_id, resolved.handler);

        let ctx =
            InvocationContext::interaction(interaction.clone(), custom_id.to_string(), resolved.data);
        Ok((resolved.handler, ctx))
    }

    fn run(&self, handler: &HandlerRef, ctx: InvocationContext) -> Result<(), DispatchError> {
        let transport = self.transport.clone();
        self.engine.invoke(handler, move |lua| {
            let table = ctx.into_table(lua, transport)?;
            Ok(MultiValue::from_vec(vec![Value::Table(table)]))
        })?;
        Ok(())
    }

    pub fn literal_count(&self) -> usize {
        self.routes.read().literals.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.routes.read().patterns.len()
    }
}
