// Configuration loading and parsing (relay.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use tictactoe_core::seed;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Fully assembled relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub games: GamesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub ws_port: u16,
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, relative to the working directory.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub lifetime_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            lifetime_minutes: 90,
        }
    }
}

impl SessionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_minutes * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GamesConfig {
    pub reset_unfinished_on_start: bool,
    pub default_page_size: u32,
}

impl Default for GamesConfig {
    fn default() -> Self {
        GamesConfig {
            reset_unfinished_on_start: true,
            default_page_size: 10,
        }
    }
}

impl ServerConfig {
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/relay.toml` relative to `base_dir`.
/// Does not copy defaults.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("relay.toml");
    let text = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::FileNotFound { path: path.clone() })?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Copy files from `defaults/` into `config/` when they are missing there.
/// Returns the files copied. `.example` templates are never copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    seed::ensure_config_files(base_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: e.to_string(),
    })
}

/// Load config from the working directory, seeding `config/` from
/// `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let base_dir = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&base_dir)?;
    load_config_from(&base_dir)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.host.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "server.host".into(),
            message: "must not be empty".into(),
        });
    }

    if config.server.ws_port != 0 && config.server.ws_port == config.server.http_port {
        return Err(ConfigError::ValidationError {
            field: "server.http_port".into(),
            message: format!("must differ from ws_port ({})", config.server.ws_port),
        });
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.session.lifetime_minutes == 0 {
        return Err(ConfigError::ValidationError {
            field: "session.lifetime_minutes".into(),
            message: "must be at least 1".into(),
        });
    }

    if !(1..=100).contains(&config.games.default_page_size) {
        return Err(ConfigError::ValidationError {
            field: "games.default_page_size".into(),
            message: format!(
                "must be between 1 and 100, got {}",
                config.games.default_page_size
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
