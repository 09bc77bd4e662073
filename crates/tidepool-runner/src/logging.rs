use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::paths::ProjectPaths;

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Default filter for a `-d` count when `RUST_LOG` is unset
fn default_filter(verbosity: u8) -> EnvFilter {
    let directives = match verbosity {
        0 => "info",
        1 => "info,scripting=debug,script=debug",
        _ => "debug",
    };
    EnvFilter::new(directives)
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbosity))
}

/// Initialize logging for a component.
///
/// Console output always; with `config.file` also a `{component}.log` in the
/// data directory. Returns a guard that must be kept alive for the duration
/// of the program.
pub fn init_logging(
    component_name: &str,
    config: &LoggingConfig,
    verbosity: u8,
) -> io::Result<Option<WorkerGuard>> {
    if !config.file {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(verbosity))
            .init();
        return Ok(None);
    }

    let log_dir = ProjectPaths::new("tidepool")
        .map(|p| p.log_dir())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(format!("{}.log", component_name));
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());
    Ok(Some(guard))
}

/// Start the file over once it grows past MAX_LOG_SIZE
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        File::create(log_path)?;
    }
    Ok(())
}
