//! Operator preferences stored as JSON

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::SkuContext;

/// Persisted operator choices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// SKU event new captures are linked to
    #[serde(default)]
    pub current_sku_event_id: Option<i64>,
}

/// Load preferences from file
pub fn load_preferences(path: &Path) -> Result<UserPreferences> {
    let content = std::fs::read_to_string(path)?;
    let preferences: UserPreferences = serde_json::from_str(&content)?;
    Ok(preferences)
}

/// Save preferences to file
pub fn save_preferences(preferences: &UserPreferences, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(preferences)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// File-backed preferences with an in-memory copy
pub struct PreferencesStore {
    path: PathBuf,
    current: Mutex<UserPreferences>,
}

impl PreferencesStore {
    /// Open the store, starting from defaults when the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = if path.exists() {
            load_preferences(&path).unwrap_or_else(|e| {
                warn!("Ignoring unreadable preferences at {}: {:#}", path.display(), e);
                UserPreferences::default()
            })
        } else {
            UserPreferences::default()
        };
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> UserPreferences {
        self.current.lock().clone()
    }

    /// Select the SKU event new captures belong to; `None` clears it
    pub fn set_current_sku_event_id(&self, id: Option<i64>) -> Result<()> {
        let mut current = self.current.lock();
        let mut updated = current.clone();
        updated.current_sku_event_id = id;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        save_preferences(&updated, &self.path)
            .with_context(|| format!("failed to write preferences to {}", self.path.display()))?;

        *current = updated;
        info!("Current SKU event set to {:?}", id);
        Ok(())
    }
}

impl SkuContext for PreferencesStore {
    fn current_sku_event_id(&self) -> Result<Option<i64>> {
        Ok(self.current.lock().current_sku_event_id)
    }
}
