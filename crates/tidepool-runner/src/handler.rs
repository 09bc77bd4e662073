use serenity::all::Interaction;
use serenity::client::Context;
use serenity::model::gateway::Ready;
use serenity::prelude::EventHandler;
use std::sync::{Arc, OnceLock};
use tidepool_events::InboundEvent;
use tidepool_scripting_host::{HostError, ScriptHost};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::config::BotSettings;
use crate::convert::{fallback_response, inbound_event};
use crate::transport::SerenityTransport;

const UNHANDLED_REPLY: &str = "Nothing is listening for that right now.";
const STARTING_REPLY: &str = "Still starting up, try again in a moment.";

/// Shared slot for the script host, filled once on the first `ready`
pub type HostSlot = Arc<OnceLock<Arc<ScriptHost>>>;

/// Gateway events in, script dispatch out
pub struct Handler {
    settings: BotSettings,
    host: HostSlot,
    fatal: UnboundedSender<HostError>,
}

impl Handler {
    pub fn new(settings: BotSettings, host: HostSlot, fatal: UnboundedSender<HostError>) -> Self {
        Self {
            settings,
            host,
            fatal,
        }
    }

    async fn start_host(&self, ctx: &Context) -> Result<Arc<ScriptHost>, HostError> {
        let transport = Arc::new(SerenityTransport::new(
            ctx.http.clone(),
            Handle::current(),
            self.settings.guild_id,
            self.settings.outbound_timeout,
        ));
        let options = self.settings.host.clone();
        let script_dir = self.settings.script_dir.clone();

        // Loading scripts publishes commands through the transport, which
        // blocks on the runtime; keep it off the async workers.
        let started = tokio::task::spawn_blocking(move || {
            let host = ScriptHost::start(options, transport)?;
            let loaded = host.load_scripts(&script_dir)?;
            info!(target: "discord", "Loaded {} script(s) from {}", loaded, script_dir.display());
            Ok::<_, HostError>(host)
        })
        .await;

        match started {
            Ok(result) => result.map(Arc::new),
            Err(e) => Err(HostError::Load {
                path: self.settings.script_dir.clone(),
                message: format!("script host startup task failed: {}", e),
            }),
        }
    }

    async fn respond(&self, ctx: &Context, interaction: &Interaction, content: &str) {
        let response = fallback_response(content);
        let result = match interaction {
            Interaction::Command(command) => command.create_response(&ctx.http, response).await,
            Interaction::Component(component) => {
                component.create_response(&ctx.http, response).await
            }
            Interaction::Modal(modal) => modal.create_response(&ctx.http, response).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!(target: "discord", "Failed to send fallback response: {}", e);
        }
    }
}

fn describe(event: &InboundEvent) -> String {
    match event {
        InboundEvent::Command(command) => format!("command /{}", command.name),
        InboundEvent::Component(component) => format!("component '{}'", component.custom_id),
        InboundEvent::Modal(modal) => format!("modal '{}'", modal.custom_id),
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(target: "discord", "Discord bot logged in as: {}", ready.user.name);

        if self.host.get().is_some() {
            debug!(target: "discord", "Reconnected; scripts are already loaded");
            return;
        }

        ctx.http.set_application_id(ready.application.id);

        match self.start_host(&ctx).await {
            Ok(host) => {
                if self.host.set(host).is_err() {
                    warn!(target: "discord", "Script host was started twice; keeping the first");
                }
            }
            Err(e) => {
                error!(target: "discord", "Failed to start scripts: {}", e);
                let _ = self.fatal.send(e);
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(event) = inbound_event(&interaction) else {
            return;
        };

        let what = describe(&event);
        info!(
            target: "discord",
            "Received {} from user {}",
            what,
            event.interaction().user.id
        );

        let Some(host) = self.host.get().cloned() else {
            warn!(target: "discord", "Dropping {}: scripts are not loaded yet", what);
            self.respond(&ctx, &interaction, STARTING_REPLY).await;
            return;
        };

        // Dispatch blocks until the handler has run on the engine thread
        match tokio::task::spawn_blocking(move || host.dispatch(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_miss() => {
                self.respond(&ctx, &interaction, UNHANDLED_REPLY).await;
            }
            Ok(Err(e)) => error!(target: "discord", "Handling {} failed: {}", what, e),
            Err(e) => error!(target: "discord", "Dispatch task for {} failed: {}", what, e),
        }
    }
}
