// Configuration loading and parsing (client.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
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

/// Fully assembled client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub relay: RelayConfig,
    pub player: PlayerConfig,
    pub sound: SoundConfig,
    pub credentials: CredentialsConfig,
}

/// Raw deserialization target for client.toml.
#[derive(Debug, Clone, Deserialize)]
struct ClientFile {
    relay: RelayConfig,
    player: PlayerConfig,
    #[serde(default)]
    sound: SoundConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// WebSocket endpoint of the relay, e.g. `ws://127.0.0.1:3001`.
    pub ws_url: String,
    /// Base URL of the relay's HTTP API, e.g. `http://127.0.0.1:3000`.
    pub http_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Name shown for the local player in the status bar.
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoundConfig {
    pub enabled: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        SoundConfig { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Value of the relay's `session` cookie, obtained from `/api/auth/login`.
    pub session_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` and the optional
/// `config/credentials.toml` relative to `base_dir`. Does not copy defaults.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let client_path = config_dir.join("client.toml");
    let client_text = read_file(&client_path)?;
    let client_file: ClientFile =
        toml::from_str(&client_text).map_err(|e| ConfigError::ParseError {
            path: client_path.clone(),
            source: e,
        })?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        relay: client_file.relay,
        player: client_file.player,
        sound: client_file.sound,
        credentials,
    };

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

/// Directory that holds `config/` and `defaults/`: the working directory
/// when it has either, otherwise the platform config directory
/// (e.g. `~/.config/tictactoe` on Linux).
pub fn resolve_base_dir() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if cwd.join("config").exists() || cwd.join("defaults").exists() {
        return Ok(cwd);
    }
    match directories::ProjectDirs::from("", "", "tictactoe") {
        Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
        None => Ok(cwd),
    }
}

/// Load config from [`resolve_base_dir`], seeding `config/` from
/// `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let base_dir = resolve_base_dir()?;
    ensure_config_files(&base_dir)?;
    load_config_from(&base_dir)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let ws = &config.relay.ws_url;
    if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
        return Err(ConfigError::ValidationError {
            field: "relay.ws_url".into(),
            message: format!("must start with ws:// or wss://, got {ws:?}"),
        });
    }

    let http = &config.relay.http_url;
    if !(http.starts_with("http://") || http.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "relay.http_url".into(),
            message: format!("must start with http:// or https://, got {http:?}"),
        });
    }

    if config.player.username.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "player.username".into(),
            message: "must not be empty".into(),
        });
    }

    if let Some(token) = &config.credentials.session_token {
        if token.contains(';') || token.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError {
                field: "credentials.session_token".into(),
                message: "must be a bare cookie value".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
