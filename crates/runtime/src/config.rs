//! Immutable daemon configuration, loaded once at startup from a TOML file.
//!
//! Every field has a default so an absent or empty config file yields a
//! working single-machine setup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use holocene_archive::LocalFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identifier used to filter plugins by `runs_on`.
    pub device: String,
    /// Data directory; `~` is expanded at load time.
    pub data_dir: PathBuf,
    /// External base URL used when building magic links.
    pub base_url: String,
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub link_checker: LinkCheckerConfig,
    pub healthcheck: HealthcheckConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "server".to_owned(),
            data_dir: PathBuf::from("~/.holocene"),
            base_url: "http://localhost:5555".to_owned(),
            server: ServerConfig::default(),
            archive: ArchiveConfig::default(),
            link_checker: LinkCheckerConfig::default(),
            healthcheck: HealthcheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 5555,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// "monolith", "warc", or "none".
    pub local_format: String,
    pub use_internet_archive: bool,
    pub ia_access_key: String,
    pub ia_secret_key: String,
    pub use_archivebox: bool,
    pub archivebox_host: String,
    pub archivebox_user: String,
    /// Skip ArchiveBox submissions when its pending queue exceeds this.
    pub queue_skip_threshold: u64,
    pub timeout_seconds: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            local_format: "monolith".to_owned(),
            use_internet_archive: true,
            ia_access_key: String::new(),
            ia_secret_key: String::new(),
            use_archivebox: false,
            archivebox_host: String::new(),
            archivebox_user: String::new(),
            queue_skip_threshold: 10,
            timeout_seconds: 60,
        }
    }
}

impl ArchiveConfig {
    #[must_use]
    pub fn default_local_format(&self) -> Option<LocalFormat> {
        match self.local_format.as_str() {
            "monolith" => Some(LocalFormat::Monolith),
            "warc" => Some(LocalFormat::Warc),
            _ => None,
        }
    }

    #[must_use]
    pub fn ia_credentials(&self) -> Option<(String, String)> {
        if self.ia_access_key.is_empty() || self.ia_secret_key.is_empty() {
            None
        } else {
            Some((self.ia_access_key.clone(), self.ia_secret_key.clone()))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkCheckerConfig {
    pub batch_size: i64,
    pub interval_seconds: u64,
    /// Pause between individual probes, to stay polite per host.
    pub delay_ms: u64,
    pub request_timeout_seconds: u64,
    /// Links checked within this window are not re-probed.
    pub recheck_days: i64,
}

impl Default for LinkCheckerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            interval_seconds: 3600,
            delay_ms: 1500,
            request_timeout_seconds: 15,
            recheck_days: 21,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    /// Daemon liveness ping target; empty disables the ticker.
    pub url: String,
    /// Link-health push monitor target; empty disables the push.
    pub link_health_push_url: String,
}

impl Config {
    /// Load from a TOML file, or fall back to defaults when the file does
    /// not exist. `~` in `data_dir` is expanded against the home directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: Self = match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            _ => Self::default(),
        };
        config.data_dir = expand_home(&config.data_dir);
        Ok(config)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("holocene.db")
    }

    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("holod.pid")
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("holod.log")
    }

    #[must_use]
    pub fn archive_root(&self) -> PathBuf {
        self.data_dir.join("archives")
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~")) else {
        return path.to_path_buf();
    };
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    home.join(rest.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.device, "server");
        assert_eq!(config.server.port, 5555);
        assert_eq!(config.link_checker.batch_size, 50);
        assert_eq!(config.link_checker.delay_ms, 1500);
        assert_eq!(config.archive.queue_skip_threshold, 10);
        assert_eq!(
            config.archive.default_local_format(),
            Some(LocalFormat::Monolith)
        );
        assert!(config.archive.ia_credentials().is_none());
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            device = "workstation"

            [server]
            port = 8080

            [archive]
            local_format = "none"
            "#,
        )
        .unwrap();
        assert_eq!(config.device, "workstation");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.archive.default_local_format().is_none());
    }

    #[test]
    fn data_dir_paths() {
        let mut config = Config::default();
        config.data_dir = PathBuf::from("/data/holocene");
        assert_eq!(config.db_path(), PathBuf::from("/data/holocene/holocene.db"));
        assert_eq!(config.pid_path(), PathBuf::from("/data/holocene/holod.pid"));
        assert_eq!(
            config.archive_root(),
            PathBuf::from("/data/holocene/archives")
        );
    }

    #[test]
    fn home_expansion() {
        let expanded = expand_home(Path::new("~/.holocene"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with(".holocene"));
    }
}
