use serenity::prelude::GatewayIntents;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tidepool_scripting_host::HostError;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::BotSettings;
use crate::handler::{Handler, HostSlot};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Discord client error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("scripts failed to start: {0}")]
    Host(#[from] HostError),
}

/// Connect to the gateway, load scripts once ready and route interactions
/// to them until Ctrl+C, a gateway failure or a script load failure.
pub async fn run_bot(settings: BotSettings) -> Result<(), RunnerError> {
    let host: HostSlot = Arc::new(OnceLock::new());
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::Client::builder(&settings.token, intents)
        .event_handler(Handler::new(settings.clone(), host.clone(), fatal_tx))
        .await?;

    info!(target: "discord", "Starting Discord bot gateway connection");

    let result = tokio::select! {
        result = client.start() => {
            match &result {
                Ok(()) => info!(target: "discord", "Discord client disconnected"),
                Err(e) => error!(target: "discord", "Discord client error: {}", e),
            }
            result.map_err(RunnerError::from)
        }
        Some(err) = fatal_rx.recv() => Err(RunnerError::Host(err)),
        _ = tokio::signal::ctrl_c() => {
            info!(target: "discord", "Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    };

    client.shard_manager.shutdown_all().await;

    if let Some(host) = host.get().cloned() {
        // Joins the engine and timer threads
        if let Err(e) = tokio::task::spawn_blocking(move || host.shutdown()).await {
            error!(target: "discord", "Script host shutdown failed: {}", e);
        }
    }

    info!(target: "discord", "Discord bot shut down");
    result
}
