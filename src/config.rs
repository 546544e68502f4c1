use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::session::SessionSettings;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Allowed origins for upgrades and CORS, comma separated. Unset allows all.
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Mount prefix of the session endpoint
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,

    /// Static directories as `prefix=dir` pairs, comma separated
    #[serde(default = "default_static_mounts")]
    pub static_mounts: String,

    /// Document served for every unmatched path
    #[serde(default = "default_landing_page")]
    pub landing_page: String,

    /// Directory for operation logs. Unset keeps everything in memory.
    pub storage_dir: Option<String>,

    /// Idle timeout for streaming connections. Unset means no timeout.
    pub ws_idle_timeout_secs: Option<u64>,

    /// Cap on a long-poll wait
    #[serde(default = "default_poll_max_wait_ms")]
    pub poll_max_wait_ms: u64,

    /// Maximum operations per response batch
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Largest client message in bytes, after decompression
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

/// A directory served under a fixed path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    pub prefix: String,
    pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),

    #[error("Invalid static mount '{0}', expected prefix=dir")]
    InvalidMount(String),

    #[error("Invalid mount prefix '{0}', must start with '/'")]
    InvalidPrefix(String),

    #[error("Static directory {0} does not exist")]
    MissingStaticDir(PathBuf),

    #[error("Landing page {path} is not readable: {source}")]
    LandingPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session prefix '{0}' collides with a static mount")]
    PrefixCollision(String),

    #[error("Mount prefix '{0}' is shadowed by the operational routes")]
    ReservedPrefix(String),
}

/// Paths owned by the API and Swagger UI routes
const RESERVED_PREFIXES: [&str; 3] = ["/api/", "/api-docs/", "/swagger/"];

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from `KEY=value` pairs
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        match envy::from_iter::<_, Config>(vars) {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn session_prefix(&self) -> Result<String, ConfigError> {
        normalize_prefix(&self.session_prefix)
    }

    /// Parse `static_mounts` into prefix/directory pairs
    pub fn static_mounts(&self) -> Result<Vec<StaticMount>, ConfigError> {
        self.static_mounts
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (prefix, root) = entry
                    .split_once('=')
                    .ok_or_else(|| ConfigError::InvalidMount(entry.to_string()))?;
                let root = root.trim();
                if root.is_empty() {
                    return Err(ConfigError::InvalidMount(entry.to_string()));
                }
                Ok(StaticMount {
                    prefix: normalize_prefix(prefix.trim())?,
                    root: PathBuf::from(root),
                })
            })
            .collect()
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: self.ws_idle_timeout_secs.map(Duration::from_secs),
            max_poll_wait: Duration::from_millis(self.poll_max_wait_ms),
            batch_limit: self.batch_limit.max(1),
            max_message_size: self.max_message_bytes,
        }
    }

    /// Check everything that must hold before serving.
    ///
    /// Returns the landing document so it is read exactly once.
    pub fn validate(&self) -> Result<Vec<u8>, ConfigError> {
        let session_prefix = self.session_prefix()?;
        reject_reserved(&session_prefix)?;
        for mount in self.static_mounts()? {
            reject_reserved(&mount.prefix)?;
            if !mount.root.is_dir() {
                return Err(ConfigError::MissingStaticDir(mount.root));
            }
            if mount.prefix == session_prefix {
                return Err(ConfigError::PrefixCollision(session_prefix));
            }
        }

        let path = PathBuf::from(&self.landing_page);
        std::fs::read(&path).map_err(|source| ConfigError::LandingPage { path, source })
    }
}

/// Mount prefixes always start and end with '/'.
fn normalize_prefix(prefix: &str) -> Result<String, ConfigError> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix.to_string()));
    }
    if prefix.ends_with('/') {
        Ok(prefix.to_string())
    } else {
        Ok(format!("{}/", prefix))
    }
}

fn reject_reserved(prefix: &str) -> Result<(), ConfigError> {
    if RESERVED_PREFIXES.iter().any(|reserved| prefix.starts_with(reserved)) {
        return Err(ConfigError::ReservedPrefix(prefix.to_string()));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            session_prefix: default_session_prefix(),
            static_mounts: default_static_mounts(),
            landing_page: default_landing_page(),
            storage_dir: None,
            ws_idle_timeout_secs: None,
            poll_max_wait_ms: default_poll_max_wait_ms(),
            batch_limit: default_batch_limit(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8181
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_prefix() -> String {
    "/log/".to_string()
}

fn default_static_mounts() -> String {
    "/assets/=assets".to_string()
}

fn default_landing_page() -> String {
    "assets/index.html".to_string()
}

fn default_poll_max_wait_ms() -> u64 {
    30_000
}

fn default_batch_limit() -> usize {
    1000
}

fn default_max_message_bytes() -> usize {
    4 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_mounts() {
        let config = Config {
            static_mounts: "/client/=client, /demo/ux=demo/ux".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.static_mounts().unwrap(),
            vec![
                StaticMount { prefix: "/client/".into(), root: "client".into() },
                StaticMount { prefix: "/demo/ux/".into(), root: "demo/ux".into() },
            ]
        );
    }

    #[test]
    fn rejects_malformed_mounts() {
        let config = Config {
            static_mounts: "client".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.static_mounts(), Err(ConfigError::InvalidMount(_))));

        let config = Config {
            static_mounts: "client/=client".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.static_mounts(), Err(ConfigError::InvalidPrefix(_))));
    }

    #[test]
    fn validate_requires_existing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let landing = dir.path().join("index.html");
        std::fs::write(&landing, "<html></html>").unwrap();

        let config = Config {
            static_mounts: format!("/static/={}", dir.path().join("missing").display()),
            landing_page: landing.display().to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingStaticDir(_))));

        let config = Config {
            static_mounts: format!("/static/={}", dir.path().display()),
            landing_page: landing.display().to_string(),
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap(), b"<html></html>");
    }

    #[test]
    fn validate_rejects_prefix_collision() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            session_prefix: "/log".to_string(),
            static_mounts: format!("/log/={}", dir.path().display()),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::PrefixCollision(_))));
    }

    #[test]
    fn validate_rejects_reserved_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            session_prefix: "/api".to_string(),
            static_mounts: String::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ReservedPrefix(p)) if p == "/api/"));

        let config = Config {
            static_mounts: format!("/swagger/ui/={}", dir.path().display()),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ReservedPrefix(_))));
    }

    #[test]
    fn malformed_variable_fails_the_whole_load() {
        let vars = [
            ("STORAGE_DIR", "/data/docs"),
            ("WS_IDLE_TIMEOUT_SECS", "ten"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()));
        assert!(matches!(Config::from_vars(vars), Err(ConfigError::EnvError(_))));
    }

    #[test]
    fn loads_from_variables() {
        let vars = [("PORT", "9000"), ("STORAGE_DIR", "/data/docs"), ("WS_IDLE_TIMEOUT_SECS", "10")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        let config = Config::from_vars(vars).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.storage_dir.as_deref(), Some("/data/docs"));
        assert_eq!(config.session_settings().idle_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.session_prefix, "/log/");
    }

    #[test]
    fn session_settings_keep_no_timeout_default() {
        let settings = Config::default().session_settings();
        assert_eq!(settings.idle_timeout, None);
        assert_eq!(settings.max_poll_wait, Duration::from_secs(30));
    }
}
