/// Host runtime for loading and executing Lua scripts
///
/// This crate owns the Lua VM and everything that feeds it: command and
/// interaction routing, deferred timers, the shared state store and the
/// bindings scripts reach through `require("tidepool")`. The chat service
/// itself sits behind the [`Transport`] trait.
pub mod bindings;
pub mod command;
pub mod context;
pub mod convert;
pub mod engine;
pub mod error;
pub mod handler;
pub mod host;
pub mod interaction;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod testing;
pub mod transport;

// Re-export commonly used types for host-side integration
pub use command::{CommandDescriptor, CommandRouter, OptionDescriptor, OptionKind};
pub use engine::{EngineHandle, EngineOptions, ScriptEngine};
pub use error::{DispatchError, EngineError, HostError, RegistrationConflict, ValidationError};
pub use handler::HandlerRef;
pub use host::{HostOptions, ScriptHost};
pub use interaction::InteractionRouter;
pub use registry::{Binding, CapabilityRegistry};
pub use scheduler::{DeferredTaskScheduler, TimerId};
pub use state::StateStore;
pub use transport::{Transport, TransportError};
