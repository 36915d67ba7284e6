//! Recognizer for frames that carry previously recorded recognizer output
//!
//! The frame's pixel buffer holds a JSON-encoded [`RecognizedText`]. Used by
//! the CLI to replay captured sessions and by tests.

use anyhow::{Context, Result};

use super::{RecognizedText, TextRecognizer};
use crate::capture::frame::Frame;

/// Decodes recorded recognizer output from frame data
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedTextRecognizer;

impl TextRecognizer for RecordedTextRecognizer {
    fn recognize(&self, frame: &dyn Frame) -> Result<Option<RecognizedText>> {
        let data = frame.data();
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let recognized: RecognizedText =
            serde_json::from_slice(data).context("frame does not hold recognized text JSON")?;
        Ok(Some(recognized))
    }
}
