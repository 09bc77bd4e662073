//! Host functions exposed to scripts, one [`Binding`](crate::registry::Binding)
//! per function.

pub mod channel;
pub mod commands;
pub mod components;
pub mod interactions;
pub mod message;
pub mod option;
pub mod reaction;
pub mod state;
pub mod timer;

use std::sync::Arc;

use crate::error::RegistrationConflict;
use crate::transport::Transport;

/// Resolve the attached transport or fail installation of `binding`
pub(crate) fn require_transport(
    transport: &Option<Arc<dyn Transport>>,
    binding: &'static str,
) -> Result<Arc<dyn Transport>, RegistrationConflict> {
    transport
        .clone()
        .ok_or(RegistrationConflict::MissingTransport(binding))
}
