use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tidepool_scripting_host::HostOptions;
use tracing::info;

use crate::paths::ProjectPaths;

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const GUILD_VAR: &str = "GUILD_ID";
pub const SCRIPTS_VAR: &str = "LUA_SCRIPTS_PATH";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no Discord token configured (set DISCORD_TOKEN or discord.token)")]
    MissingToken,

    #[error("no guild configured (set GUILD_ID or discord.guild_id)")]
    MissingGuild,

    #[error("invalid guild id '{0}'")]
    InvalidGuild(String),

    #[error("script directory {} does not exist", .0.display())]
    MissingScriptDir(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: Option<String>,

    /// Guild that commands are registered in
    #[serde(default)]
    pub guild_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Directory containing scripts (default: ~/.local/share/tidepool/scripts)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// How long a dispatch waits for its handler; unset waits forever
    #[serde(default)]
    pub invoke_timeout_ms: Option<u64>,

    /// Upper bound on each outbound Discord request
    #[serde(default = "default_outbound_timeout")]
    pub outbound_timeout_ms: u64,

    #[serde(default = "default_sweep_interval")]
    pub state_sweep_interval_secs: u64,
}

fn default_outbound_timeout() -> u64 {
    10_000
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            script_dir: None,
            invoke_timeout_ms: None,
            outbound_timeout_ms: default_outbound_timeout(),
            state_sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ScriptingConfig {
    /// The configured script directory, or the default one
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            ProjectPaths::new("tidepool")
                .map(|p| p.scripts_dir())
                .unwrap_or_else(|| PathBuf::from("scripts"))
        })
    }

    pub fn host_options(&self) -> HostOptions {
        HostOptions {
            invoke_timeout: self.invoke_timeout_ms.map(Duration::from_millis),
            state_sweep_interval: Duration::from_secs(self.state_sweep_interval_secs.max(1)),
        }
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_millis(self.outbound_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the data directory
    #[serde(default)]
    pub file: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TidepoolConfig {
    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Everything needed to connect, after validation
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub guild_id: u64,
    pub script_dir: PathBuf,
    pub host: HostOptions,
    pub outbound_timeout: Duration,
}

impl TidepoolConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectPaths::new("tidepool").map(|p| p.config_file())
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicitly given file must exist; a missing default file just
    /// means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `DISCORD_TOKEN`, `GUILD_ID` and `LUA_SCRIPTS_PATH` from the
    /// process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigLoadError> {
        if let Some(token) = lookup(TOKEN_VAR).filter(|t| !t.is_empty()) {
            self.discord.token = Some(token);
        }
        if let Some(guild) = lookup(GUILD_VAR).filter(|g| !g.is_empty()) {
            self.discord.guild_id = Some(parse_guild(&guild)?);
        }
        if let Some(dir) = lookup(SCRIPTS_VAR).filter(|d| !d.is_empty()) {
            self.scripting.script_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<BotSettings, ConfigLoadError> {
        let token = self
            .discord
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigLoadError::MissingToken)?;

        let guild_id = match self.discord.guild_id {
            Some(0) => return Err(ConfigLoadError::InvalidGuild("0".to_string())),
            Some(id) => id,
            None => return Err(ConfigLoadError::MissingGuild),
        };

        let script_dir = self.scripting.script_dir();
        if !script_dir.is_dir() {
            return Err(ConfigLoadError::MissingScriptDir(script_dir));
        }

        Ok(BotSettings {
            token,
            guild_id,
            script_dir,
            host: self.scripting.host_options(),
            outbound_timeout: self.scripting.outbound_timeout(),
        })
    }
}

fn parse_guild(value: &str) -> Result<u64, ConfigLoadError> {
    match value.trim().parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ConfigLoadError::InvalidGuild(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config: TidepoolConfig = toml::from_str(
            r#"
            [discord]
            token = "abc"
            guild_id = 1234

            [scripting]
            invoke_timeout_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(config.discord.token.as_deref(), Some("abc"));
        assert_eq!(config.discord.guild_id, Some(1234));
        assert_eq!(config.scripting.outbound_timeout_ms, 10_000);
        assert_eq!(config.scripting.state_sweep_interval_secs, 60);
        assert!(!config.logging.file);

        let options = config.scripting.host_options();
        assert_eq!(options.invoke_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(options.state_sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = TidepoolConfig::default();
        config.discord.token = Some("from-file".to_string());

        config
            .apply_overrides(env(&[
                (TOKEN_VAR, "from-env"),
                (GUILD_VAR, "987"),
                (SCRIPTS_VAR, "/srv/scripts"),
            ]))
            .unwrap();

        assert_eq!(config.discord.token.as_deref(), Some("from-env"));
        assert_eq!(config.discord.guild_id, Some(987));
        assert_eq!(
            config.scripting.script_dir,
            Some(PathBuf::from("/srv/scripts"))
        );
    }

    #[test]
    fn test_bad_guild_override() {
        let mut config = TidepoolConfig::default();
        let err = config
            .apply_overrides(env(&[(GUILD_VAR, "not-a-number")]))
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidGuild(_)));

        let err = config.apply_overrides(env(&[(GUILD_VAR, "0")])).unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidGuild(_)));
    }

    #[test]
    fn test_validate() {
        let tmp = TempDir::new().unwrap();
        let mut config = TidepoolConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::MissingToken)
        ));

        config.discord.token = Some("abc".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::MissingGuild)
        ));

        config.discord.guild_id = Some(42);
        config.scripting.script_dir = Some(tmp.path().join("missing"));
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::MissingScriptDir(_))
        ));

        config.scripting.script_dir = Some(tmp.path().to_path_buf());
        let settings = config.validate().unwrap();
        assert_eq!(settings.guild_id, 42);
        assert_eq!(settings.script_dir, tmp.path());
        assert_eq!(settings.outbound_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[logging]\nfile = true\n").unwrap();

        let config = TidepoolConfig::load(Some(&path)).unwrap();
        assert!(config.logging.file);

        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            TidepoolConfig::load(Some(&missing)),
            Err(ConfigLoadError::NotFound(_))
        ));

        fs::write(&path, "[discord\n").unwrap();
        assert!(matches!(
            TidepoolConfig::load_from(&path),
            Err(ConfigLoadError::Parse(_))
        ));
    }
}
