//! Application settings storage
//!
//! Stores configuration like the Gemini API key and the current profile in a
//! JSON file in the app data directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::db::Profile;
use crate::error::{GenieError, Result};

/// Global settings instance
static SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// Path to config file (set during init)
static CONFIG_PATH: RwLock<Option<PathBuf>> = RwLock::new(None);

pub const APP_DIR_NAME: &str = "com.genieconnect.app";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Profile remembered between CLI invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredProfile {
    pub id: i64,
    pub nickname: String,
    pub avatar_emoji: String,
}

impl From<&Profile> for StoredProfile {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            nickname: profile.nickname.clone(),
            avatar_emoji: profile.avatar_emoji.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    /// Process-wide budget for the assistant endpoint
    #[serde(default = "default_ai_requests_per_minute")]
    pub ai_requests_per_minute: u32,
    #[serde(default)]
    pub current_profile: Option<StoredProfile>,
    #[serde(default)]
    pub custom_db_path: Option<String>,
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_ai_requests_per_minute() -> u32 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            ai_requests_per_minute: default_ai_requests_per_minute(),
            current_profile: None,
            custom_db_path: None,
        }
    }
}

impl Settings {
    /// Load settings from disk or create default
    fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                    Settings::default()
                }),
                Err(_) => Settings::default(),
            }
        } else {
            Settings::default()
        }
    }

    /// Save settings to disk
    fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GenieError::Settings(format!("Failed to serialize settings: {}", e)))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GenieError::Settings(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(path, content)
            .map_err(|e| GenieError::Settings(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }
}

/// Default app data directory (`<data_dir>/com.genieconnect.app`)
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Initialize settings with the app data directory
pub fn init(app_data_dir: PathBuf) {
    let config_path = app_data_dir.join("settings.json");
    let settings = Settings::load(&config_path);

    if let Ok(mut guard) = CONFIG_PATH.write() {
        *guard = Some(config_path);
    }
    if let Ok(mut guard) = SETTINGS.write() {
        *guard = Some(settings);
    }
}

/// Snapshot of the current settings (defaults if `init` was never called)
pub fn current() -> Settings {
    SETTINGS.read()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or_default()
}

/// Apply `f` to the settings and persist the result
fn update<F: FnOnce(&mut Settings)>(f: F) -> Result<()> {
    let mut settings_guard = SETTINGS.write()
        .map_err(|_| GenieError::Settings("Failed to acquire settings lock".to_string()))?;

    let settings = settings_guard.get_or_insert_with(Settings::default);
    f(settings);

    let config_path = CONFIG_PATH.read()
        .map_err(|_| GenieError::Settings("Failed to acquire config path lock".to_string()))?
        .clone()
        .ok_or_else(|| GenieError::Settings("Settings not initialized".to_string()))?;

    settings.save(&config_path)
}

// ==================== Gemini API Key ====================

/// Get the Gemini API key (checks env var first, then stored setting)
pub fn get_api_key() -> Option<String> {
    // Environment variable takes precedence
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }

    current().gemini_api_key.filter(|k| !k.is_empty())
}

/// Set and save the API key; an empty key clears it
pub fn set_api_key(key: String) -> Result<()> {
    update(|s| s.gemini_api_key = if key.is_empty() { None } else { Some(key) })?;
    info!("Gemini API key saved to settings");
    Ok(())
}

/// Get masked API key for display (shows first 8 / last 4 chars)
pub fn get_masked_api_key() -> Option<String> {
    get_api_key().map(|key| mask_key(&key))
}

fn mask_key(key: &str) -> String {
    if key.len() > 12 && key.is_ascii() {
        format!("{}...{}", &key[..8], &key[key.len() - 4..])
    } else {
        "*".repeat(key.chars().count())
    }
}

// ==================== Current profile ====================

pub fn get_stored_profile() -> Option<StoredProfile> {
    current().current_profile
}

pub fn store_profile(profile: StoredProfile) -> Result<()> {
    update(|s| s.current_profile = Some(profile))
}

pub fn clear_profile() -> Result<()> {
    update(|s| s.current_profile = None)
}

// ==================== Misc ====================

pub fn get_custom_db_path() -> Option<String> {
    current().custom_db_path.filter(|p| !p.is_empty())
}

pub fn set_custom_db_path(path: Option<String>) -> Result<()> {
    update(|s| s.custom_db_path = path)
}

/// Locate the database file.
///
/// Order: explicit argument, `GENIE_DB`, stored custom path, a `.genie.db`
/// found walking up from the working directory, then the app data directory.
pub fn find_database(db_arg: Option<&str>) -> PathBuf {
    if let Some(path) = db_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("GENIE_DB") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = get_custom_db_path() {
        return PathBuf::from(path);
    }

    if let Ok(cwd) = std::env::current_dir() {
        if let Some(found) = find_dotfile_from(&cwd) {
            return found;
        }
    }

    app_data_dir().join("genie.db")
}

fn find_dotfile_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(".genie.db");
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}
