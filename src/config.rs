//! Configuration for the native host.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file (`<config dir>/filewatcher/settings.toml`, or `--config`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FILEWATCHER_` and use double
//! underscores to separate nested levels:
//! - `FILEWATCHER_WATCH__QUIET_PERIOD_MS=250` sets `watch.quiet_period_ms`
//! - `FILEWATCHER_LOGGING__DEFAULT=debug` sets `logging.default`
//!
//! The browser starts the host with an arbitrary working directory, so no
//! workspace lookup is done: only the per-user config directory is consulted.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::APP_NAME;
use crate::watcher::WatchOptions;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FILEWATCHER_";

/// Placeholder reported when the executable path cannot be resolved.
pub const UNDEFINED_EXECUTABLE: &str = "...undefined...";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Change coalescing settings
    #[serde(default)]
    pub watch: WatchSettings,

    /// Diagnostic output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchSettings {
    /// Quiet period before a burst of changes triggers a reload
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Capacity of each watcher's raw event queue
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every target (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `filewatcher::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_quiet_period_ms() -> u64 {
    1000
}
fn default_event_buffer() -> usize {
    crate::watcher::DEFAULT_EVENT_BUFFER
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Per-user settings file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("settings.toml"))
    }

    /// Load configuration from all sources.
    ///
    /// `path` overrides the default settings file. A missing file is not an
    /// error; defaults and environment overrides still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let config_path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(config_path) = config_path {
            figment = figment.merge(Toml::file(config_path));
        }

        figment
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Box::new)
    }

    /// Render the settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

/// Process-wide configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Resolved path of the running binary.
    pub executable: Option<PathBuf>,
    /// Coalescing period for reload notifications.
    pub quiet_period: Duration,
    /// Capacity of each watcher's raw event queue.
    pub event_buffer: usize,
}

impl RuntimeConfig {
    pub fn new(executable: Option<PathBuf>, settings: &Settings) -> Self {
        Self {
            executable,
            quiet_period: Duration::from_millis(settings.watch.quiet_period_ms),
            event_buffer: settings.watch.event_buffer.max(1),
        }
    }

    /// Build from settings, resolving the path of the current executable.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(resolve_executable(), settings)
    }

    /// Executable path as reported to the extension.
    pub fn executable_display(&self) -> String {
        self.executable
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| UNDEFINED_EXECUTABLE.to_string())
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            quiet_period: self.quiet_period,
            event_buffer: self.event_buffer,
        }
    }
}

fn resolve_executable() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.canonicalize().unwrap_or(exe))
}
