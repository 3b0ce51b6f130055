// Configuration loading and parsing (config/board.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

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
// board.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire board.toml file.
#[derive(Debug, Clone, Deserialize)]
struct BoardFile {
    feed: FeedConfig,
    celebration: CelebrationConfig,
    reveal: RevealConfig,
    proxy: ProxyConfig,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// URL of the roster/sales collaborator (normally the local proxy).
    pub url: String,
    pub poll_interval_secs: u64,
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CelebrationConfig {
    /// Total on-screen duration of one celebration.
    pub display_secs: u64,
    /// Audio fade-out window at the tail of the display window.
    pub fade_secs: u64,
    /// Number of discrete volume steps across the fade window.
    pub fade_steps: u32,
    /// Pause between one celebration closing and the next starting.
    pub settle_ms: u64,
    /// Playback volume at acquisition, restored on release.
    pub initial_volume: f64,
    /// Fallback celebration track when an agent has none configured or the
    /// configured track fails to start.
    pub default_track: String,
}

impl CelebrationConfig {
    pub fn display(&self) -> Duration {
        Duration::from_secs(self.display_secs)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_secs(self.fade_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevealConfig {
    /// Fixed duration of the numeric count-up, regardless of magnitude.
    pub duration_secs: u64,
}

impl RevealConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub port: u16,
    /// The spreadsheet-to-JSON bridge the proxy forwards to.
    pub upstream_url: String,
    /// Origins reflected in CORS headers; `["*"]` (or empty) allows any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// The public assembled configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub feed: FeedConfig,
    pub celebration: CelebrationConfig,
    pub reveal: RevealConfig,
    pub proxy: ProxyConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/board.toml` relative to the
/// given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization
/// automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let board_path = base_dir.join("config").join("board.toml");
    let text = read_file(&board_path)?;
    let file: BoardFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: board_path.clone(),
        source: e,
    })?;

    let config = Config {
        feed: file.feed,
        celebration: file.celebration,
        reveal: file.reveal,
        proxy: file.proxy,
        db_path: file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, keep the operator's copy.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults into place first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.feed.url.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "feed.url".into(),
            message: "must not be empty".into(),
        });
    }

    if config.feed.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "feed.poll_interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    let cel = &config.celebration;
    if cel.display_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "celebration.display_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if cel.fade_secs >= cel.display_secs {
        return Err(ConfigError::ValidationError {
            field: "celebration.fade_secs".into(),
            message: format!(
                "must be shorter than display_secs ({} >= {})",
                cel.fade_secs, cel.display_secs
            ),
        });
    }
    if cel.fade_steps == 0 {
        return Err(ConfigError::ValidationError {
            field: "celebration.fade_steps".into(),
            message: "must be greater than 0".into(),
        });
    }
    if !(cel.initial_volume > 0.0 && cel.initial_volume <= 1.0) {
        return Err(ConfigError::ValidationError {
            field: "celebration.initial_volume".into(),
            message: format!("must be in (0.0, 1.0], got {}", cel.initial_volume),
        });
    }

    if config.reveal.duration_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "reveal.duration_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.proxy.enabled {
        if config.proxy.port == 0 {
            return Err(ConfigError::ValidationError {
                field: "proxy.port".into(),
                message: "must be non-zero when the proxy is enabled".into(),
            });
        }
        if config.proxy.upstream_url.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "proxy.upstream_url".into(),
                message: "must not be empty when the proxy is enabled".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
