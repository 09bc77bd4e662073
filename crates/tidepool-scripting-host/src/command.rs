//! Slash command descriptors and the router that maps invocations to handlers.
//!
//! Each routable node of a command gets a handler id scoped to its path:
//! the command itself is `settings`, its `theme` subcommand is
//! `settings_theme`. Dispatch resolves at most one subcommand level; nested
//! subcommands inside a subcommand are not routed.

use mlua::{MultiValue, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tidepool_events::{CommandInvocation, CommandOption, OptionValue};
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::engine::EngineHandle;
use crate::error::{DispatchError, RegistrationConflict};
use crate::handler::HandlerRef;
use crate::transport::Transport;

/// Discord option types, by their wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    SubCommand = 1,
    SubCommandGroup = 2,
    String = 3,
    Integer = 4,
    Boolean = 5,
    User = 6,
    Channel = 7,
    Role = 8,
    Mentionable = 9,
    Number = 10,
    Attachment = 11,
}

impl OptionKind {
    pub const ALL: [OptionKind; 11] = [
        OptionKind::SubCommand,
        OptionKind::SubCommandGroup,
        OptionKind::String,
        OptionKind::Integer,
        OptionKind::Boolean,
        OptionKind::User,
        OptionKind::Channel,
        OptionKind::Role,
        OptionKind::Mentionable,
        OptionKind::Number,
        OptionKind::Attachment,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() as i64 == code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name of the constant scripts use for this kind
    pub fn constant_name(self) -> &'static str {
        match self {
            OptionKind::SubCommand => "option_subcommand",
            OptionKind::SubCommandGroup => "option_subcommand_group",
            OptionKind::String => "option_string",
            OptionKind::Integer => "option_integer",
            OptionKind::Boolean => "option_boolean",
            OptionKind::User => "option_user",
            OptionKind::Channel => "option_channel",
            OptionKind::Role => "option_role",
            OptionKind::Mentionable => "option_mentionable",
            OptionKind::Number => "option_number",
            OptionKind::Attachment => "option_attachment",
        }
    }
}

/// One declared option of a command
///
/// `H` is whatever identifies the handler: a Lua function while the script
/// is declaring the command, a [`HandlerRef`] once it is registered.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor<H = HandlerRef> {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    /// Nested options, only meaningful for subcommands
    pub children: Vec<OptionDescriptor<H>>,
    pub handler: Option<H>,
}

impl<H> OptionDescriptor<H> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            children: Vec::new(),
            handler: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_child(mut self, child: OptionDescriptor<H>) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }
}

/// A top-level command declaration
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor<H = HandlerRef> {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionDescriptor<H>>,
    pub handler: Option<H>,
}

impl<H> CommandDescriptor<H> {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            handler: None,
        }
    }

    pub fn with_option(mut self, option: OptionDescriptor<H>) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }
}

/// A successful route lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub handler: HandlerRef,
    pub path: String,
    /// Every leaf option at any depth; the deepest occurrence of a name wins
    pub options: BTreeMap<String, OptionValue>,
}

#[derive(Default)]
struct CommandTable {
    commands: BTreeMap<String, CommandDescriptor>,
    handlers: HashMap<String, HandlerRef>,
}

pub struct CommandRouter {
    engine: EngineHandle,
    transport: Arc<dyn Transport>,
    table: RwLock<CommandTable>,
}

impl CommandRouter {
    pub fn new(engine: EngineHandle, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            transport,
            table: RwLock::new(CommandTable::default()),
        }
    }

    /// Validate and register `descriptor`.
    ///
    /// The whole descriptor is checked before anything changes, so a rejected
    /// command leaves the router untouched. For every accepted handler `bind`
    /// is called with its generated reference.
    pub fn register<H>(
        &self,
        descriptor: CommandDescriptor<H>,
        mut bind: impl FnMut(&HandlerRef, H),
    ) -> Result<CommandDescriptor, RegistrationConflict> {
        let mut table = self.table.write();

        if table.commands.contains_key(&descriptor.name) {
            return Err(RegistrationConflict::DuplicateCommand(descriptor.name));
        }

        let mut paths = Vec::new();
        if descriptor.handler.is_some() {
            paths.push(descriptor.name.clone());
        }
        collect_paths(&descriptor.name, &descriptor.options, &mut paths)?;

        if paths.is_empty() {
            return Err(RegistrationConflict::MissingHandler {
                path: descriptor.name,
            });
        }

        for (i, path) in paths.iter().enumerate() {
            if table.handlers.contains_key(path) || paths[..i].contains(path) {
                return Err(RegistrationConflict::HandlerCollision(path.clone()));
            }
        }

        let registered = bind_command(descriptor, &mut bind);
        for path in paths {
            table.handlers.insert(path.clone(), HandlerRef::scoped(path));
        }
        table
            .commands
            .insert(registered.name.clone(), registered.clone());

        info!(target: "scripting", "Registered command /{}", registered.name);
        Ok(registered)
    }

    /// Publish a registered command through the transport
    pub fn publish(&self, descriptor: &CommandDescriptor) -> Result<(), crate::TransportError> {
        self.transport.register_command(descriptor)
    }

    /// Find the handler for an invocation without running it
    pub fn resolve(
        &self,
        name: &str,
        options: &[CommandOption],
    ) -> Result<ResolvedCommand, DispatchError> {
        let path = match options
            .iter()
            .find(|o| matches!(o.value, OptionValue::SubCommand(_)))
        {
            Some(sub) => format!("{}_{}", name, sub.name),
            None => name.to_string(),
        };

        let handler = self
            .table
            .read()
            .handlers
            .get(&path)
            .cloned()
            .ok_or_else(|| DispatchError::Miss {
                kind: "command",
                key: path.clone(),
            })?;

        Ok(ResolvedCommand {
            handler,
            path,
            options: flatten_options(options),
        })
    }

    /// Route an invocation to its handler and block until it has run
    pub fn dispatch(&self, invocation: &CommandInvocation) -> Result<(), DispatchError> {
        let resolved = match self.resolve(&invocation.name, &invocation.options) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(target: "scripting", "Unhandled command /{}: {}", invocation.name, e);
                return Err(e);
            }
        };

        debug!(target: "scripting", "Dispatching /{} to '{}'", invocation.name, resolved.path);

        let ctx = InvocationContext::command(
            invocation.interaction.clone(),
            invocation.name.clone(),
            resolved.options,
        );
        let transport = self.transport.clone();
        self.engine.invoke(&resolved.handler, move |lua| {
            let table = ctx.into_table(lua, transport)?;
            Ok(MultiValue::from_vec(vec![Value::Table(table)]))
        })?;
        Ok(())
    }

    pub fn command_names(&self) -> Vec<String> {
        self.table.read().commands.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<CommandDescriptor> {
        self.table.read().commands.get(name).cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.table.read().handlers.len()
    }
}

fn collect_paths<H>(
    parent: &str,
    options: &[OptionDescriptor<H>],
    paths: &mut Vec<String>,
) -> Result<(), RegistrationConflict> {
    for option in options {
        let path = format!("{}_{}", parent, option.name);
        match option.kind {
            OptionKind::SubCommand => {
                if option.handler.is_none() {
                    return Err(RegistrationConflict::MissingHandler { path });
                }
                collect_paths(&path, &option.children, paths)?;
                paths.push(path);
            }
            OptionKind::SubCommandGroup => {
                return Err(RegistrationConflict::UnroutableOption {
                    path,
                    code: option.kind.code(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn bind_command<H>(
    descriptor: CommandDescriptor<H>,
    bind: &mut impl FnMut(&HandlerRef, H),
) -> CommandDescriptor {
    let name = descriptor.name;
    let handler = descriptor.handler.map(|h| {
        let handler = HandlerRef::scoped(name.clone());
        bind(&handler, h);
        handler
    });
    let options = bind_options(&name, descriptor.options, bind);

    CommandDescriptor {
        name,
        description: descriptor.description,
        options,
        handler,
    }
}

fn bind_options<H>(
    parent: &str,
    options: Vec<OptionDescriptor<H>>,
    bind: &mut impl FnMut(&HandlerRef, H),
) -> Vec<OptionDescriptor> {
    options
        .into_iter()
        .map(|option| {
            let path = format!("{}_{}", parent, option.name);
            let routable = option.kind == OptionKind::SubCommand;
            let handler = option.handler.and_then(|h| {
                // Handlers on leaf options are never dispatched to
                routable.then(|| {
                    let handler = HandlerRef::scoped(path.clone());
                    bind(&handler, h);
                    handler
                })
            });

            OptionDescriptor {
                children: bind_options(&path, option.children, bind),
                name: option.name,
                description: option.description,
                kind: option.kind,
                required: option.required,
                handler,
            }
        })
        .collect()
}

/// Collect leaf values at every depth into one map
pub fn flatten_options(options: &[CommandOption]) -> BTreeMap<String, OptionValue> {
    let mut found: BTreeMap<String, (usize, OptionValue)> = BTreeMap::new();
    flatten_into(options, 0, &mut found);
    found
        .into_iter()
        .map(|(name, (_, value))| (name, value))
        .collect()
}

fn flatten_into(
    options: &[CommandOption],
    depth: usize,
    found: &mut BTreeMap<String, (usize, OptionValue)>,
) {
    for option in options {
        match option.value.children() {
            Some(children) => flatten_into(children, depth + 1, found),
            None => {
                let deeper = found
                    .get(&option.name)
                    .map_or(true, |(seen_at, _)| depth >= *seen_at);
                if deeper {
                    found.insert(option.name.clone(), (depth, option.value.clone()));
                }
            }
        }
    }
}
