//! Configuration for pagemanifest.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PAGEMANIFEST_HOME, PAGEMANIFEST_STORE)
//! 2. Config file (.pagemanifest/config.yaml)
//! 3. Defaults (~/.pagemanifest)
//!
//! Config file discovery:
//! - Searches current directory and parents for .pagemanifest/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::http::DEFAULT_USER_AGENT;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Directory holding the config file
const CONFIG_DIR: &str = ".pagemanifest";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub persistence: Option<PersistenceConfig>,
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Home directory (relative to .pagemanifest/)
    pub home: Option<String>,
    /// Manifest store directory (relative to the project root)
    pub store: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to pagemanifest home
    pub home: PathBuf,
    /// Directory of the manifest store
    pub store: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Persistence batching
    pub persistence: PersistenceSettings,
    /// HTTP fetch settings
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    pub debounce_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl PersistenceSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine file settings with defaults
fn settings_from(config: Option<&ConfigFile>) -> (PersistenceSettings, FetchSettings) {
    let defaults = FetchSettings::default();

    let persistence = PersistenceSettings {
        debounce_ms: config
            .and_then(|c| c.persistence.as_ref())
            .and_then(|p| p.debounce_ms)
            .unwrap_or(PersistenceSettings::default().debounce_ms),
    };

    let fetch_config = config.and_then(|c| c.fetch.as_ref());
    let fetch = FetchSettings {
        timeout_seconds: fetch_config
            .and_then(|f| f.timeout_seconds)
            .unwrap_or(defaults.timeout_seconds),
        user_agent: fetch_config
            .and_then(|f| f.user_agent.clone())
            .unwrap_or(defaults.user_agent),
    };

    (persistence, fetch)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = find_config_file();
    let parsed = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Ok(env_home) = std::env::var("PAGEMANIFEST_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home_path)) = (
        config_file.as_ref(),
        parsed.as_ref().and_then(|c| c.paths.home.as_ref()),
    ) {
        // home is relative to .pagemanifest/
        let config_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    let store = if let Ok(env_store) = std::env::var("PAGEMANIFEST_STORE") {
        PathBuf::from(env_store)
    } else if let (Some(path), Some(store_path)) = (
        config_file.as_ref(),
        parsed.as_ref().and_then(|c| c.paths.store.as_ref()),
    ) {
        // Project root is the parent of .pagemanifest/
        let base_dir = path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));
        resolve_path(base_dir, store_path)
    } else {
        home.join("store")
    };

    let (persistence, fetch) = settings_from(parsed.as_ref());

    Ok(ResolvedConfig {
        home,
        store,
        config_file,
        persistence,
        fetch,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the manifest store directory
pub fn store_dir() -> Result<PathBuf> {
    Ok(config()?.store.clone())
}
