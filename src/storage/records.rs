//! Stored record types

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A scanned product barcode; opens a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuEvent {
    pub id: i64,
    pub barcode: String,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// A saved serial capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCapture {
    pub id: i64,
    /// Normalized serial, unique across the store
    pub payload: String,
    pub label: Option<String>,
    /// Where the operator found the code (e.g. "label", "packaging")
    pub source: Option<String>,
    pub note: Option<String>,
    /// Epoch milliseconds
    pub captured_at: i64,
    /// Explicit session link; may point at a deleted event
    pub sku_event_id: Option<i64>,
}

/// A capture not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCapture {
    pub payload: String,
    pub label: Option<String>,
    pub source: Option<String>,
    pub note: Option<String>,
    pub captured_at: i64,
    pub sku_event_id: Option<i64>,
}

impl NewCapture {
    /// Capture of `payload` taken now with no details or session link
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            label: None,
            source: None,
            note: None,
            captured_at: now_millis(),
            sku_event_id: None,
        }
    }

    pub fn with_sku_event(mut self, sku_event_id: Option<i64>) -> Self {
        self.sku_event_id = sku_event_id;
        self
    }

    pub fn captured_at(mut self, captured_at: i64) -> Self {
        self.captured_at = captured_at;
        self
    }
}

/// Latest report written for a SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuExport {
    pub id: i64,
    pub barcode: String,
    pub file_name: String,
    pub capture_count: usize,
    /// Epoch milliseconds
    pub updated_at: i64,
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-millisecond timestamp as local `YYYY-MM-DD HH:MM`
///
/// Out-of-range values fall back to the raw number.
pub fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(utc) => DateTime::<Local>::from(utc).format("%Y-%m-%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}
