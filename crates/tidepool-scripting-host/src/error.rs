use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the script engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("script engine is not running")]
    Stopped,

    #[error("failed to start script engine: {0}")]
    Spawn(String),

    /// A script error or panic inside a handler, caught at the engine boundary
    #[error("handler '{label}' failed: {message}")]
    Handler { label: String, message: String },

    #[error("handler '{label}' did not finish within {after:?}")]
    Timeout { label: String, after: Duration },

    /// A blocking call was issued from the engine thread itself
    #[error("blocking call '{label}' issued from the engine thread")]
    Reentrant { label: String },
}

impl EngineError {
    pub(crate) fn handler(label: &str, err: impl std::fmt::Display) -> Self {
        EngineError::Handler {
            label: label.to_string(),
            message: err.to_string(),
        }
    }
}

/// Malformed arguments passed to a binding
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid argument: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<ValidationError> for mlua::Error {
    fn from(err: ValidationError) -> Self {
        mlua::Error::external(err)
    }
}

/// A route or command that cannot be registered
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationConflict {
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("subcommand '{path}' has no handler")]
    MissingHandler { path: String },

    #[error("option '{path}' has kind {code} which cannot be routed")]
    UnroutableOption { path: String, code: u8 },

    #[error("option '{path}' has unknown kind {code}")]
    UnknownKind { path: String, code: i64 },

    #[error("handler id '{0}' is already bound")]
    HandlerCollision(String),

    #[error("invalid interaction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("capability registry is already installed")]
    AlreadyInstalled,

    #[error("binding '{0}' needs a transport but none was attached")]
    MissingTransport(&'static str),

    #[error("binding group '{group}' already has '{name}'")]
    DuplicateBinding { group: String, name: &'static str },
}

impl From<RegistrationConflict> for mlua::Error {
    fn from(err: RegistrationConflict) -> Self {
        mlua::Error::external(err)
    }
}

/// Failures routing an inbound event to a script handler
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("no {kind} route for '{key}'")]
    Miss { kind: &'static str, key: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl DispatchError {
    pub fn is_miss(&self) -> bool {
        matches!(self, DispatchError::Miss { .. })
    }
}

/// Failures while bringing up or loading the script host
#[derive(Debug, Error)]
pub enum HostError {
    #[error("script directory {} does not exist", .0.display())]
    MissingScriptDir(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    #[error(transparent)]
    Registration(#[from] RegistrationConflict),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
