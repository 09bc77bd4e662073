use std::path::PathBuf;

/// Where tidepool keeps its config file, scripts and logs
///
/// Follows the XDG base directory layout on Unix-like systems
/// (`$XDG_CONFIG_HOME/{name}`, `$XDG_DATA_HOME/{name}`) and `%APPDATA%\{name}`
/// on Windows.
pub struct ProjectPaths {
    name: String,
    home: PathBuf,
}

impl ProjectPaths {
    /// `None` when no home directory can be determined
    pub fn new(name: &str) -> Option<Self> {
        Some(ProjectPaths {
            name: name.to_string(),
            home: home_dir()?,
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base("XDG_CONFIG_HOME", &[".config"])
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base("XDG_DATA_HOME", &[".local", "share"])
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir().join("scripts")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    #[cfg(target_os = "windows")]
    fn base(&self, _xdg_var: &str, _fallback: &[&str]) -> PathBuf {
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home.clone())
            .join(&self.name)
    }

    #[cfg(not(target_os = "windows"))]
    fn base(&self, xdg_var: &str, fallback: &[&str]) -> PathBuf {
        std::env::var(xdg_var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| fallback.iter().fold(self.home.clone(), |p, part| p.join(part)))
            .join(&self.name)
    }
}

/// Respects HOME, then USERPROFILE
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_contain_name() {
        if let Some(paths) = ProjectPaths::new("tidepool") {
            assert!(paths.config_file().to_string_lossy().contains("tidepool"));
            assert!(paths.scripts_dir().ends_with("tidepool/scripts"));
            assert!(paths.log_dir().ends_with("tidepool/logs"));
        }
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_home_fallback_layout() {
        let paths = ProjectPaths {
            name: "tp".to_string(),
            home: PathBuf::from("/home/sam"),
        };
        // The XDG variables may be set in the test environment
        let data = paths.data_dir();
        assert!(data.ends_with("tp"));
        if std::env::var("XDG_DATA_HOME").map_or(true, |v| v.is_empty()) {
            assert_eq!(data, PathBuf::from("/home/sam/.local/share/tp"));
        }
    }
}
