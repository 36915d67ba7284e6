//! Storage Layer
//!
//! Persists SKU events and text captures in SQLite and the operator's
//! current SKU selection as JSON.

pub mod database;
pub mod preferences;
pub mod records;

use anyhow::Result;
use std::path::PathBuf;

pub use database::Database;
pub use preferences::{PreferencesStore, UserPreferences};
pub use records::{format_timestamp, now_millis, NewCapture, SkuEvent, SkuExport, TextCapture};

/// Persistence the capture workflow and session grouping depend on
pub trait CaptureStore: Send + Sync {
    /// Capture already stored under this payload, if any
    fn find_capture_by_payload(&self, payload: &str) -> Result<Option<TextCapture>>;
    /// Store a capture, returning its id
    fn save_capture(&self, capture: &NewCapture) -> Result<i64>;
    fn list_sku_events(&self) -> Result<Vec<SkuEvent>>;
    fn list_text_captures(&self) -> Result<Vec<TextCapture>>;
}

/// Source of the SKU event new captures should be linked to
pub trait SkuContext: Send + Sync {
    fn current_sku_event_id(&self) -> Result<Option<i64>>;
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "sirim", "SirimCapture")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "sirim", "SirimCapture")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
