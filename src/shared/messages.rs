//! Status messages emitted by the scanner coordinator

use std::fmt;

/// Operator-facing status updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// A payload different from the last one appeared
    TextDetected(String),
    /// Payload confirmed and the scanner is frozen
    Confirmed(String),
    /// Text recognition failed on a frame
    ScanFailed(String),
    /// Save started
    Saving(String),
    /// Stored under the given capture id
    Saved { payload: String, capture_id: i64 },
    /// Payload already stored
    Duplicate { payload: String, existing_id: i64 },
    /// Store call failed; detection kept for retry
    SaveFailed(String),
    /// Scanner reset for the next code
    Ready,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::TextDetected(payload) => write!(f, "Text detected: {payload}"),
            StatusMessage::Confirmed(payload) => write!(f, "Confirmed {payload}"),
            StatusMessage::ScanFailed(reason) => write!(f, "Scan failed: {reason}"),
            StatusMessage::Saving(payload) => write!(f, "Saving {payload}..."),
            StatusMessage::Saved { payload, capture_id } => {
                write!(f, "Saved {payload} as capture #{capture_id}")
            }
            StatusMessage::Duplicate { payload, existing_id } => {
                write!(f, "Duplicate: {payload} already saved as capture #{existing_id}")
            }
            StatusMessage::SaveFailed(reason) => write!(f, "Save failed: {reason}"),
            StatusMessage::Ready => write!(f, "Ready to scan"),
        }
    }
}
