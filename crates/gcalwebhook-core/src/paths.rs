//! Configuration directory resolution.
//!
//! Everything the tool persists lives under a single per-user directory:
//! `$XDG_CONFIG_HOME/gcalendar-webhook-cli` when the variable is set and
//! non-empty, otherwise `~/.config/gcalendar-webhook-cli` on every platform.

use std::path::{Path, PathBuf};

/// Name of the application subdirectory inside the configuration root.
pub const APP_DIR_NAME: &str = "gcalendar-webhook-cli";

/// Document name of the persisted OAuth token bundle.
pub const TOKENS_FILE: &str = "tokens.json";

/// Document name of the persisted channel collection.
pub const CHANNELS_FILE: &str = "channels.json";

/// Resolved locations of the files the tool manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    config_dir: PathBuf,
}

impl ConfigPaths {
    /// Resolves paths from the process environment.
    pub fn from_env() -> Self {
        Self::resolve(std::env::var("XDG_CONFIG_HOME").ok().as_deref())
    }

    /// Resolves paths from an explicit `XDG_CONFIG_HOME` value.
    pub fn resolve(xdg_config_home: Option<&str>) -> Self {
        let base = match xdg_config_home.map(str::trim) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => dirs::home_dir()
                .map(|home| home.join(".config"))
                .or_else(dirs::config_dir)
                .unwrap_or_else(|| PathBuf::from(".config")),
        };
        Self::with_dir(base.join(APP_DIR_NAME))
    }

    /// Uses `config_dir` as-is (tests, custom setups).
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// The configuration directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Full path of `tokens.json`.
    pub fn tokens_file(&self) -> PathBuf {
        self.config_dir.join(TOKENS_FILE)
    }

    /// Full path of `channels.json`.
    pub fn channels_file(&self) -> PathBuf {
        self.config_dir.join(CHANNELS_FILE)
    }
}
