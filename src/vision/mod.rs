//! Vision Layer
//!
//! Turns a text recognizer's output for one frame into at most one serial
//! [`Detection`]. The recognizer itself is an external capability behind the
//! [`TextRecognizer`] trait; everything after it is deterministic:
//! - reference marker matching
//! - serial normalization and validation
//! - candidate selection
//! - bounding box normalization for overlay rendering

pub mod bbox;
pub mod recorded;
pub mod reference;
pub mod selector;
pub mod serial;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::capture::frame::Frame;

pub use bbox::{normalize_box, NormalizedBox, PixelRect};
pub use recorded::RecordedTextRecognizer;
pub use reference::{has_reference_markers, ReferenceKeywordSet, DEFAULT_REFERENCE_MARKERS};
pub use selector::{select_payload, PayloadSelector};
pub use serial::{matches_serial_pattern, normalize_serial, SerialRule, SerialRuleSetting};

/// Recognized text of one frame: transcript plus visually grouped blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    /// Full-frame transcript
    #[serde(default)]
    pub text: String,
    /// Text blocks in recognition order
    #[serde(default)]
    pub blocks: Vec<TextBlock>,
}

/// Visually grouped cluster of text lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Block bounds in pixels, when the recognizer reports them
    #[serde(default)]
    pub bounds: Option<PixelRect>,
    /// Lines in reading order
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    /// Concatenated text of all lines
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single recognized line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    /// Raw line content
    pub text: String,
    /// Line bounds in pixels
    #[serde(default)]
    pub bounds: Option<PixelRect>,
}

/// Serial found in a single frame, before operator confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Normalized serial, never empty
    pub payload: String,
    /// Source line bounds in pixels
    pub bounding_box: Option<PixelRect>,
    /// Bounds relative to the upright frame, for highlighting
    pub normalized_box: Option<NormalizedBox>,
}

impl Detection {
    pub fn new(payload: String, bounding_box: Option<PixelRect>) -> Self {
        Self {
            payload,
            bounding_box,
            normalized_box: None,
        }
    }

    /// Attach the unit-square box computed from the frame geometry
    pub fn with_frame_geometry(mut self, width: u32, height: u32, rotation_degrees: i32) -> Self {
        self.normalized_box = self
            .bounding_box
            .map(|rect| normalize_box(&rect, width, height, rotation_degrees));
        self
    }
}

/// On-device text recognition capability
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in a frame; `Ok(None)` when nothing could be read
    fn recognize(&self, frame: &dyn Frame) -> Result<Option<RecognizedText>>;
}

/// Recognizer + selector + box normalizer for live frames
pub struct TextAnalyzer {
    recognizer: Arc<dyn TextRecognizer>,
    selector: RwLock<PayloadSelector>,
}

impl TextAnalyzer {
    /// Create an analyzer around a recognizer
    pub fn new(recognizer: Arc<dyn TextRecognizer>, selector: PayloadSelector) -> Self {
        Self {
            recognizer,
            selector: RwLock::new(selector),
        }
    }

    /// Replace the reference keywords used for subsequent frames
    pub fn update_reference_keywords(&self, keywords: ReferenceKeywordSet) {
        self.selector.write().keywords = keywords;
    }

    /// Replace the serial rule used for subsequent frames
    pub fn update_serial_rule(&self, rule: SerialRule) {
        self.selector.write().rule = rule;
    }

    /// Snapshot of the current selector configuration
    pub fn selector(&self) -> PayloadSelector {
        self.selector.read().clone()
    }

    /// Recognize and select a serial in a frame
    pub fn analyze(&self, frame: &dyn Frame) -> Result<Option<Detection>> {
        let start = Instant::now();
        let Some(recognized) = self.recognizer.recognize(frame)? else {
            return Ok(None);
        };

        let detection = self.analyze_text(
            &recognized,
            frame.width(),
            frame.height(),
            frame.rotation_degrees(),
        );

        debug!(
            "Frame analysis complete in {:?}: {} blocks, detection {:?}",
            start.elapsed(),
            recognized.blocks.len(),
            detection.as_ref().map(|d| d.payload.as_str())
        );

        Ok(detection)
    }

    /// Select a serial from already-recognized text of a frame with the given geometry
    pub fn analyze_text(
        &self,
        recognized: &RecognizedText,
        width: u32,
        height: u32,
        rotation_degrees: i32,
    ) -> Option<Detection> {
        self.selector
            .read()
            .select(recognized)
            .map(|detection| detection.with_frame_geometry(width, height, rotation_degrees))
    }
}
