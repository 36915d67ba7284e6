//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::storage::{get_config_dir, get_data_dir};
use crate::vision::{PayloadSelector, ReferenceKeywordSet, SerialRule, SerialRuleSetting};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Serial scanning settings
    pub scanner: ScannerSettings,
    /// Storage locations
    pub storage: StorageConfig,
    /// Export settings
    pub export: ExportConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Scanning-related settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Markers that must be visible near a serial; empty uses the built-in set
    pub reference_keywords: ReferenceKeywordSet,
    /// Accepted serial format
    pub serial_rule: SerialRuleSetting,
}

impl ScannerSettings {
    /// Selector configured from these settings
    pub fn selector(&self) -> Result<PayloadSelector> {
        let rule = SerialRule::from_setting(&self.serial_rule)?;
        Ok(PayloadSelector::new(self.reference_keywords.clone(), rule))
    }
}

/// Storage locations; unset paths resolve to the platform directories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: Option<PathBuf>,
    /// Preferences JSON file
    pub preferences_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("captures.db")),
        }
    }

    pub fn preferences_path(&self) -> Result<PathBuf> {
        match &self.preferences_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join("preferences.json")),
        }
    }
}

/// Export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Report directory
    pub directory: Option<PathBuf>,
}

impl ExportConfig {
    pub fn directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_data_dir()?.join("exports")),
        }
    }
}

/// Default configuration file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load configuration, falling back to defaults when the file is missing
///
/// A file that exists but cannot be parsed is an error.
pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }
    let config = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Err(e) = config.scanner.selector() {
        warn!("Configured serial rule is invalid: {:#}", e);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scanner.reference_keywords, ReferenceKeywordSet::builtin());
        assert_eq!(config.scanner.serial_rule, SerialRuleSetting::Certification);
        assert!(config.storage.database_path.is_none());
        assert!(config.storage.preferences_path.is_none());
        assert!(config.export.directory.is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.scanner.serial_rule = SerialRuleSetting::Pattern(r"^X\d{3}$".to_string());
        config.storage.database_path = Some(PathBuf::from("/tmp/captures.db"));

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.scanner.serial_rule, config.scanner.serial_rule);
        assert_eq!(parsed.scanner.reference_keywords, config.scanner.reference_keywords);
        assert_eq!(parsed.storage.database_path, config.storage.database_path);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [scanner]
            reference_keywords = ["  sirim   qas ", "Approved"]
            serial_rule = "alphanumeric"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.general.log_level, "info");
        assert_eq!(
            parsed.scanner.reference_keywords.configured(),
            &["SIRIM QAS".to_string(), "APPROVED".to_string()]
        );
        assert_eq!(parsed.scanner.serial_rule, SerialRuleSetting::Alphanumeric);
        assert!(parsed.scanner.selector().is_ok());
    }

    #[test]
    fn test_pattern_rule_from_toml() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [scanner]
            serial_rule = { pattern = "^[0-9]{4}$" }
            "#,
        )
        .unwrap();

        let selector = parsed.scanner.selector().unwrap();
        assert!(selector.rule.matches("1234"));
        assert!(!selector.rule.matches("TAB1234567"));
    }

    #[test]
    fn test_invalid_pattern_rejected_by_selector() {
        let mut settings = ScannerSettings::default();
        settings.serial_rule = SerialRuleSetting::Pattern("(".to_string());
        assert!(settings.selector().is_err());
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = AppConfig {
            storage: StorageConfig {
                database_path: Some(PathBuf::from("db.sqlite")),
                preferences_path: Some(PathBuf::from("prefs.json")),
            },
            export: ExportConfig {
                directory: Some(PathBuf::from("out")),
            },
            ..AppConfig::default()
        };

        assert_eq!(config.storage.database_path().unwrap(), PathBuf::from("db.sqlite"));
        assert_eq!(config.storage.preferences_path().unwrap(), PathBuf::from("prefs.json"));
        assert_eq!(config.export.directory().unwrap(), PathBuf::from("out"));
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.general.log_level, loaded.general.log_level);
        assert_eq!(config.scanner.serial_rule, loaded.scanner.serial_rule);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = load_or_default(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        assert!(load_config(temp_file.path()).is_err());
        assert!(load_or_default(temp_file.path()).is_err());
    }
}
