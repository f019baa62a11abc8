//! Configuration file discovery and loading.
//!
//! Paths come from the platform project directories unless overridden via
//! [`CONFIG_ENV`] / [`DATA_ENV`]. A missing config file is created with the
//! defaults on first run.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub mod themes;

pub use themes::{Palette, Theme};

const APP_QUALIFIER: &str = "io";
const APP_ORG: &str = "Scratchpad";
const APP_NAME: &str = "scratchpad";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "scratchpad.db";

pub const CONFIG_ENV: &str = "SCRATCHPAD_CONFIG";
pub const DATA_ENV: &str = "SCRATCHPAD_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        ConfigPaths::discover().map(Self::with_paths)
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Loads the config file, writing one with the defaults if none exists.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if self.paths.config_file.exists() {
            return self.load();
        }
        let config = self.finish(AppConfig::default());
        let rendered = toml::to_string_pretty(&config).context("serializing default config")?;
        fs::write(&self.paths.config_file, rendered).with_context(|| {
            format!(
                "writing default config {}",
                self.paths.config_file.display()
            )
        })?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(config)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let file = &self.paths.config_file;
        let raw = fs::read_to_string(file)
            .with_context(|| format!("reading config {}", file.display()))?;
        let parsed: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", file.display()))?;
        Ok(self.finish(parsed))
    }

    fn finish(&self, mut config: AppConfig) -> AppConfig {
        config.post_load(&self.paths);
        config
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
            .context("resolving platform project directories")?;

        let (config_dir, config_file) = match env::var_os(CONFIG_ENV).map(PathBuf::from) {
            Some(path) => split_config_override(path),
            None => {
                let dir = dirs.config_dir().to_path_buf();
                let file = dir.join(CONFIG_FILE_NAME);
                (dir, file)
            }
        };
        let data_dir = env::var_os(DATA_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| dirs.data_dir().to_path_buf());
        let state_dir = match dirs.state_dir() {
            Some(dir) => dir.to_path_buf(),
            None => data_dir.join("state"),
        };

        Ok(Self::from_roots(config_dir, config_file, data_dir, state_dir))
    }

    /// Lays out every path under explicit roots; used by discovery and tests.
    pub fn from_roots(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            database_path: data_dir.join(DATABASE_FILE_NAME),
            log_dir: state_dir.join("logs"),
            config_dir,
            config_file,
            data_dir,
            state_dir,
        }
    }

    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join(CONFIG_FILE_NAME);
        Self::from_roots(config_dir, config_file, root.join("data"), root.join("state"))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        [&self.config_dir, &self.data_dir, &self.state_dir, &self.log_dir]
            .into_iter()
            .try_for_each(|dir| {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating directory {}", dir.display()))
            })
    }
}

/// An override may name a directory or a file inside one.
fn split_config_override(path: PathBuf) -> (PathBuf, PathBuf) {
    if path.is_dir() || path.extension().is_none() {
        let file = path.join(CONFIG_FILE_NAME);
        return (path, file);
    }
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    (dir, path)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub autosave: AutoSaveConfig,
    pub storage: StorageOptions,
    pub ui: UiOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        if self.ui.tick_rate_ms == 0 {
            tracing::warn!("ui.tick_rate_ms of 0 is not allowed, using default");
            self.ui.tick_rate_ms = UiOptions::default().tick_rate_ms;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub debounce_ms: u64,
    /// Persist a pending edit when the session closes before the debounce fires.
    pub flush_on_exit: bool,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 700,
            flush_on_exit: true,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub tick_rate_ms: u64,
    /// Theme used until one has been persisted.
    pub default_theme: Theme,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            tick_rate_ms: 100,
            default_theme: Theme::Dark,
        }
    }
}

impl UiOptions {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }
}
