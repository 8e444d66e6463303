use crate::lang::Language;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

const APP_DIR_NAME: &str = ".forest_mod_manager";
const CONFIG_FILE_NAME: &str = ".forest_mod_manager.json";
pub const DEFAULT_EGG_CHANCE: u8 = 10;

/// Per-user file layout. Everything lives under the home directory.
#[derive(Debug, Clone, Serialize)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub mods_cache: PathBuf,
    pub logs_dir: PathBuf,
    pub install_lock: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let base = BaseDirs::new().context("resolve home dir")?;
        Ok(Self::under(base.home_dir()))
    }

    pub fn under(home: &Path) -> Self {
        let data_dir = home.join(APP_DIR_NAME);
        Self {
            config_file: home.join(CONFIG_FILE_NAME),
            mods_cache: data_dir.join("mods"),
            logs_dir: data_dir.join("logs"),
            install_lock: data_dir.join("install.lock"),
            data_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<String>,
}

impl ArchiveRecord {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            imported_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "modapi_path")]
    pub install_root: Option<PathBuf>,
    #[serde(rename = "saved_mods")]
    pub archives: Vec<ArchiveRecord>,
    pub language: String,
    #[serde(deserialize_with = "lenient")]
    pub tutorial_shown: bool,
    #[serde(deserialize_with = "lenient")]
    pub last_update_check: Option<String>,
    #[serde(deserialize_with = "egg_chance_from_any_number")]
    pub egg_chance: u8,
}

/// Falls back to `T::default()` when the stored value has the wrong type, so
/// one bad field never discards the rest of the file.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Accepts any JSON number and clamps it to 0..=100; anything else yields the
/// default chance.
fn egg_chance_from_any_number<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let chance = Value::deserialize(deserializer)?
        .as_f64()
        .filter(|value| value.is_finite())
        .map(|value| value.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(DEFAULT_EGG_CHANCE);
    Ok(chance)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_root: None,
            archives: Vec::new(),
            language: Language::default().code().to_string(),
            tutorial_shown: false,
            last_update_check: None,
            egg_chance: DEFAULT_EGG_CHANCE,
        }
    }
}

impl Settings {
    /// Reads the settings file. A missing file yields defaults; so does an
    /// unreadable one, after a warning.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        let path = &paths.config_file;
        if !path.exists() {
            info!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).context("read settings")?;
        match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => {
                info!("settings loaded from {}", path.display());
                Ok(settings)
            }
            Err(err) => {
                warn!("failed to parse {}: {err}; using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, paths: &AppPaths) -> Result<()> {
        let path = &paths.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create settings dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, raw).context("write settings temp")?;
        fs::rename(&temp, path).context("finalize settings")?;
        Ok(())
    }

    pub fn current_install_root(&self) -> Option<&Path> {
        self.install_root.as_deref()
    }

    pub fn language(&self) -> Language {
        Language::from_code(&self.language).unwrap_or_default()
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language.code().to_string();
    }

    /// Clamped to 0..=100.
    pub fn set_egg_chance(&mut self, chance: u32) {
        self.egg_chance = chance.min(100) as u8;
    }

    pub fn find_archive(&self, filename: &str) -> Option<&ArchiveRecord> {
        self.archives.iter().find(|record| record.filename == filename)
    }
}
