pub mod config;
pub mod convert;
mod handler;
pub mod logging;
pub mod paths;
mod runner;
mod transport;

pub use config::{BotSettings, ConfigLoadError, TidepoolConfig};
pub use handler::{Handler, HostSlot};
pub use logging::init_logging;
pub use paths::ProjectPaths;
pub use runner::{run_bot, RunnerError};
pub use transport::SerenityTransport;
