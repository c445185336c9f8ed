//! Configuration resolution for Cloneguard.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/cloneguard/settings.json)
//! 3. Project config (.cloneguard/settings.json)
//! 4. Environment variables (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::url::default_staging_suffixes;

/// Complete Cloneguard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            resolution: ResolutionConfig::default(),
            database_path: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Remote install-registry API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Registry base URL (e.g., "<https://api.cloneguard.io>").
    pub base_url: String,
    /// Bearer token for registry authentication.
    pub token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Clone-resolution policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Maximum automatic-resolution attempts before requiring manual action.
    pub max_retries: u32,
    /// TTL of the resolution lock (seconds); bounds one pass's execution time.
    pub lock_ttl_secs: i64,
    /// Grace window for temporary-duplicate mode (days).
    pub temporary_duplicate_days: i64,
    /// Staging-provider domain suffixes treated as non-clone environments.
    pub staging_suffixes: Vec<String>,
    /// Whether license activation is attempted for localhost clones.
    pub localhost_activation: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lock_ttl_secs: 180,
            temporary_duplicate_days: 2 * 7, // 14 days
            staging_suffixes: default_staging_suffixes(),
            localhost_activation: true,
        }
    }
}

impl ResolutionConfig {
    /// Grace window for temporary-duplicate mode, in seconds.
    pub const fn temporary_duplicate_secs(&self) -> i64 {
        self.temporary_duplicate_days * 24 * 60 * 60
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".cloneguard").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".cloneguard").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/cloneguard/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("cloneguard").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".cloneguard").join("cloneguard.db"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/cloneguard/cloneguard.db"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("cloneguard").join("cloneguard.db"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    // Merge api config
    if !overlay.api.base_url.is_empty() {
        base.api.base_url = overlay.api.base_url;
    }
    if !overlay.api.token.is_empty() {
        base.api.token = overlay.api.token;
    }
    base.api.timeout_secs = overlay.api.timeout_secs;

    // Merge resolution config
    base.resolution = overlay.resolution;

    if overlay.database_path.is_some() {
        base.database_path = overlay.database_path;
    }
    base.log_level = overlay.log_level;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("CLONEGUARD_API_URL") {
        config.api.base_url = val;
    }
    if let Ok(val) = std::env::var("CLONEGUARD_API_TOKEN") {
        config.api.token = val;
    }
    if let Ok(val) = std::env::var("CLONEGUARD_MAX_RETRIES") {
        if let Ok(n) = val.parse() {
            config.resolution.max_retries = n;
        }
    }
    if let Ok(val) = std::env::var("CLONEGUARD_DB_PATH") {
        config.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("CLONEGUARD_LOG_LEVEL") {
        config.log_level = val;
    }
}
