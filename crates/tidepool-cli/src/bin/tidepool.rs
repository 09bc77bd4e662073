use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tidepool_runner::{init_logging, run_bot, TidepoolConfig};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Run Lua scripts as a Discord bot", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/tidepool/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script directory, overriding config and LUA_SCRIPTS_PATH
    #[arg(short, long)]
    scripts: Option<PathBuf>,

    /// Also log to a file in the data directory
    #[arg(long)]
    log_file: bool,

    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TidepoolConfig::load(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(scripts) = cli.scripts {
        config.scripting.script_dir = Some(scripts);
    }
    config.logging.file |= cli.log_file;

    let _log_guard =
        init_logging("tidepool", &config.logging, cli.debug).context("Failed to set up logging")?;

    let settings = config.validate()?;
    info!(
        "Starting tidepool for guild {} with scripts from {}",
        settings.guild_id,
        settings.script_dir.display()
    );

    run_bot(settings).await?;
    Ok(())
}
