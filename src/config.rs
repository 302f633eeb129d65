//! Application-level configuration loading: scene timings and storage selection.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::state::{
    idle_timer::{DEFAULT_IDLE_THRESHOLD, MAX_IDLE_THRESHOLD, MIN_IDLE_THRESHOLD},
    rapid_input::{DEFAULT_RAPID_INPUT_WINDOW, MAX_RAPID_INPUT_WINDOW, MIN_RAPID_INPUT_WINDOW},
    scene::{DEFAULT_BADGE_EXIT_DELAY, SceneTimings},
    store::DEFAULT_PERSISTENCE_TIMEOUT,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TIGERFIRE_CONFIG_PATH";
/// Directory used by the file backend when none is configured.
const DEFAULT_DATA_DIR: &str = "data";

/// Where progress is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process memory only; lost on restart.
    Memory,
    /// JSON documents in a local directory.
    File {
        /// Directory holding the documents.
        #[serde(default = "default_data_dir")]
        path: PathBuf,
    },
    /// CouchDB, configured through `COUCH_*` variables.
    Couch,
    /// MongoDB, configured through `MONGO_*` variables.
    Mongo,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            path: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Reasons a configuration document is refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is outside its accepted range.
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    timings: SceneTimings,
    persistence_timeout: Duration,
    storage: StorageConfig,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        idle = ?config.timings.idle_threshold,
                        storage = ?config.storage,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON document. Missing keys take their default.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        raw.validate()?;
        Ok(raw.into())
    }

    /// Timings handed to every scene controller.
    pub fn scene_timings(&self) -> SceneTimings {
        self.timings
    }

    /// Upper bound for a single storage write.
    pub fn persistence_timeout(&self) -> Duration {
        self.persistence_timeout
    }

    /// Selected persistence backend.
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    idle_timeout_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    rapid_input_window_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    badge_exit_delay_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    persistence_timeout_ms: Duration,
    storage: StorageConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_THRESHOLD,
            rapid_input_window_ms: DEFAULT_RAPID_INPUT_WINDOW,
            badge_exit_delay_ms: DEFAULT_BADGE_EXIT_DELAY,
            persistence_timeout_ms: DEFAULT_PERSISTENCE_TIMEOUT,
            storage: StorageConfig::default(),
        }
    }
}

impl Validate for RawConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let window = self.rapid_input_window_ms;
        if !(MIN_RAPID_INPUT_WINDOW..=MAX_RAPID_INPUT_WINDOW).contains(&window) {
            let mut err = ValidationError::new("rapid_input_window_ms");
            err.message = Some(
                format!(
                    "rapid input window must be between {} and {} ms (got {})",
                    MIN_RAPID_INPUT_WINDOW.as_millis(),
                    MAX_RAPID_INPUT_WINDOW.as_millis(),
                    window.as_millis()
                )
                .into(),
            );
            errors.add("rapid_input_window_ms", err);
        }
        if self.idle_timeout_ms.is_zero() {
            let mut err = ValidationError::new("idle_timeout_ms");
            err.message = Some("idle timeout must be positive".into());
            errors.add("idle_timeout_ms", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let idle_threshold = raw
            .idle_timeout_ms
            .clamp(MIN_IDLE_THRESHOLD, MAX_IDLE_THRESHOLD);
        if idle_threshold != raw.idle_timeout_ms {
            warn!(
                requested = ?raw.idle_timeout_ms,
                applied = ?idle_threshold,
                "idle timeout out of range; clamped"
            );
        }

        let persistence_timeout = if raw.persistence_timeout_ms.is_zero() {
            warn!("persistence timeout of zero ignored");
            DEFAULT_PERSISTENCE_TIMEOUT
        } else {
            raw.persistence_timeout_ms
        };

        Self {
            timings: SceneTimings {
                idle_threshold,
                rapid_input_window: raw.rapid_input_window_ms,
                badge_exit_delay: raw.badge_exit_delay_ms,
            },
            persistence_timeout,
            storage: raw.storage,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
