//! TOML configuration with per-field defaults.
//!
//! Every field has a serde default so a partial (or absent) config file
//! still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AuraError;

/// Top-level AuraTask configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub guest: GuestConfig,
    #[serde(default)]
    pub weights: WeightConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Remote data gateway (BaaS) endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Base URL of the backend, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: String,
    /// Public anon key sent with every request.
    #[serde(default)]
    pub anon_key: String,
    /// Secret used to derive the at-rest encryption key for user API keys.
    #[serde(default)]
    pub encryption_secret: String,
}

/// AI feature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Master switch for AI features (ranking, subtasks, emoji).
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
        }
    }
}

/// Guest session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Maximum number of tasks a guest may create before signing in.
    #[serde(default = "default_guest_task_limit")]
    pub task_limit: usize,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            task_limit: default_guest_task_limit(),
        }
    }
}

/// Default speed/importance weighting used when AI ranking is disabled
/// or unavailable. Percentages, 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightConfig {
    #[serde(default = "default_weight")]
    pub speed: u8,
    #[serde(default = "default_weight")]
    pub importance: u8,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            speed: default_weight(),
            importance: default_weight(),
        }
    }
}

fn default_name() -> String {
    "auratask".to_string()
}

fn default_data_dir() -> String {
    "~/.auratask".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_guest_task_limit() -> usize {
    5
}

fn default_weight() -> u8 {
    50
}

fn default_true() -> bool {
    true
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, AuraError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| AuraError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| AuraError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
