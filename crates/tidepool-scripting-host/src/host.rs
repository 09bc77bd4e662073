use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tidepool_events::{CommandInvocation, ComponentInteraction, InboundEvent, ModalSubmit};
use tracing::{debug, info};

use crate::bindings::channel::ChannelGet;
use crate::bindings::commands::RegisterCommand;
use crate::bindings::components::{NewButton, NewSelectMenu, NewSelectOption};
use crate::bindings::interactions::RegisterInteraction;
use crate::bindings::message::{MessageBinding, MessageOp};
use crate::bindings::option::NewOption;
use crate::bindings::reaction::ReactionBinding;
use crate::bindings::state::{StateBinding, StateOp, StateValue};
use crate::bindings::timer::RunAfter;
use crate::command::CommandRouter;
use crate::engine::{EngineOptions, ScriptEngine};
use crate::error::{DispatchError, EngineError, HostError, RegistrationConflict};
use crate::interaction::InteractionRouter;
use crate::loader::{discover_scripts, package_path_entries};
use crate::registry::{CapabilityRegistry, DEFAULT_GROUP};
use crate::scheduler::DeferredTaskScheduler;
use crate::state::{StateStore, SweeperGuard, DEFAULT_SWEEP_INTERVAL};
use crate::transport::Transport;

/// Settings for a [`ScriptHost`]
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// How long a dispatch waits for its handler; `None` waits forever
    pub invoke_timeout: Option<Duration>,
    pub state_sweep_interval: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            invoke_timeout: None,
            state_sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Owns the VM and every component that feeds it
///
/// Construction starts the engine, the timer thread and the state sweeper,
/// then installs the capability registry. Scripts can be loaded as soon as
/// `start` returns.
pub struct ScriptHost {
    engine: ScriptEngine,
    scheduler: Arc<DeferredTaskScheduler>,
    commands: Arc<CommandRouter>,
    interactions: Arc<InteractionRouter>,
    state: Arc<StateStore<StateValue>>,
    sweeper: Mutex<Option<SweeperGuard>>,
}

impl ScriptHost {
    pub fn start(options: HostOptions, transport: Arc<dyn Transport>) -> Result<Self, HostError> {
        let engine = ScriptEngine::start(EngineOptions {
            invoke_timeout: options.invoke_timeout,
        })?;
        let scheduler = Arc::new(DeferredTaskScheduler::start(engine.handle())?);
        let commands = Arc::new(CommandRouter::new(engine.handle(), transport.clone()));
        let interactions = Arc::new(InteractionRouter::new(engine.handle(), transport.clone()));
        let state = Arc::new(StateStore::new());
        let sweeper = state.start_sweeper(options.state_sweep_interval);

        let mut registry = standard_registry(&commands, &interactions, &scheduler, &state)?;
        registry.attach(transport);
        engine.execute("install", move |lua| registry.install(lua))?;

        info!(target: "scripting", "Script host started");

        Ok(Self {
            engine,
            scheduler,
            commands,
            interactions,
            state,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Load every script under `dir`. Stops at the first script that fails.
    pub fn load_scripts(&self, dir: &Path) -> Result<usize, HostError> {
        let scripts = discover_scripts(dir)?;

        let entries = package_path_entries(dir);
        self.engine.execute("package.path", move |lua| {
            let package: mlua::Table = lua.globals().get("package")?;
            let current: String = package.get("path")?;
            package.set("path", format!("{};{}", entries, current))
        })?;

        for path in &scripts {
            let source = fs::read_to_string(path).map_err(|source| HostError::Io {
                path: path.clone(),
                source,
            })?;
            self.load_chunk(&path.display().to_string(), source)
                .map_err(|e| match e {
                    HostError::Load { message, .. } => HostError::Load {
                        path: path.clone(),
                        message,
                    },
                    other => other,
                })?;
        }

        info!(target: "scripting", "Loaded {} script(s) from {}", scripts.len(), dir.display());
        Ok(scripts.len())
    }

    /// Run one chunk of script source, e.g. a script embedded in a test
    pub fn load_source(&self, name: &str, source: &str) -> Result<(), HostError> {
        self.load_chunk(name, source.to_string())
    }

    fn load_chunk(&self, name: &str, source: String) -> Result<(), HostError> {
        debug!(target: "scripting", "Loading {}", name);
        let chunk_name = format!("@{}", name);
        self.engine
            .execute(name, move |lua| lua.load(source).set_name(chunk_name).exec())
            .map_err(|e| match e {
                EngineError::Handler { message, .. } => HostError::Load {
                    path: name.into(),
                    message,
                },
                other => HostError::Engine(other),
            })
    }

    pub fn dispatch_command(&self, invocation: &CommandInvocation) -> Result<(), DispatchError> {
        self.commands.dispatch(invocation)
    }

    pub fn dispatch_component(&self, event: &ComponentInteraction) -> Result<(), DispatchError> {
        self.interactions.dispatch_component(event)
    }

    pub fn dispatch_modal(&self, event: &ModalSubmit) -> Result<(), DispatchError> {
        self.interactions.dispatch_modal(event)
    }

    pub fn dispatch(&self, event: &InboundEvent) -> Result<(), DispatchError> {
        match event {
            InboundEvent::Command(cmd) => self.dispatch_command(cmd),
            InboundEvent::Component(component) => self.dispatch_component(component),
            InboundEvent::Modal(modal) => self.dispatch_modal(modal),
        }
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    pub fn commands(&self) -> &Arc<CommandRouter> {
        &self.commands
    }

    pub fn interactions(&self) -> &Arc<InteractionRouter> {
        &self.interactions
    }

    pub fn scheduler(&self) -> &Arc<DeferredTaskScheduler> {
        &self.scheduler
    }

    pub fn state(&self) -> &Arc<StateStore<StateValue>> {
        &self.state
    }

    /// Stop timers, the sweeper and finally the engine
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.sweeper.lock().take();
        if self.engine.is_alive() {
            self.engine.shutdown();
            info!(target: "scripting", "Script host stopped");
        }
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn standard_registry(
    commands: &Arc<CommandRouter>,
    interactions: &Arc<InteractionRouter>,
    scheduler: &Arc<DeferredTaskScheduler>,
    state: &Arc<StateStore<StateValue>>,
) -> Result<CapabilityRegistry, RegistrationConflict> {
    let mut registry = CapabilityRegistry::new();

    registry.add(DEFAULT_GROUP, RegisterCommand::new(commands.clone()))?;
    registry.add(DEFAULT_GROUP, RegisterInteraction::literal(interactions.clone()))?;
    registry.add(DEFAULT_GROUP, RegisterInteraction::pattern(interactions.clone()))?;
    registry.add(DEFAULT_GROUP, NewButton)?;
    registry.add(DEFAULT_GROUP, NewSelectMenu)?;
    registry.add(DEFAULT_GROUP, NewSelectOption)?;

    registry.add("timer", RunAfter::new(scheduler.clone()))?;

    for op in [StateOp::Get, StateOp::Set, StateOp::Clear] {
        registry.add("state", StateBinding::new(op, state.clone()))?;
    }

    for op in [
        MessageOp::Add,
        MessageOp::Send,
        MessageOp::Edit,
        MessageOp::Delete,
    ] {
        registry.add("message", MessageBinding::new(op))?;
    }

    registry.add("reaction", ReactionBinding::add())?;
    registry.add("reaction", ReactionBinding::remove())?;
    registry.add("channel", ChannelGet::default())?;

    for option in NewOption::all() {
        registry.add("option", option)?;
    }

    Ok(registry)
}
