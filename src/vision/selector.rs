//! Serial candidate selection over one frame's recognized text
//!
//! Certification codes sit beneath a fixed reference marker, so a line is only
//! accepted when it matches the serial rule *and* a reference block either
//! contains it or sits above it on screen. Among the accepted lines the lowest
//! one wins.

use tracing::debug;

use super::bbox::PixelRect;
use super::reference::{has_reference_markers, ReferenceKeywordSet};
use super::serial::{normalize_serial, SerialRule};
use super::{Detection, RecognizedText, TextBlock};

/// Block with a usable box, tagged with whether it carries a reference marker
struct BlockCandidate<'a> {
    block: &'a TextBlock,
    bounds: PixelRect,
    has_reference: bool,
}

/// Line whose normalized text matches the serial rule
struct LineCandidate {
    normalized: String,
    /// The line's own box, when the recognizer reported one
    bounds: Option<PixelRect>,
    /// Box used for ordering: the line's own, else its block's
    anchor: PixelRect,
    block_has_reference: bool,
}

/// Selector bound to a keyword set and serial rule
#[derive(Debug, Clone, Default)]
pub struct PayloadSelector {
    pub keywords: ReferenceKeywordSet,
    pub rule: SerialRule,
}

impl PayloadSelector {
    pub fn new(keywords: ReferenceKeywordSet, rule: SerialRule) -> Self {
        Self { keywords, rule }
    }

    /// Pick at most one serial from the recognized text
    pub fn select(&self, recognized: &RecognizedText) -> Option<Detection> {
        select_payload(recognized, &self.keywords, &self.rule)
    }
}

/// Pick at most one serial from the recognized text of a frame
///
/// Returns `None` when no trustworthy serial is visible; callers treat that as
/// "still searching".
pub fn select_payload(
    recognized: &RecognizedText,
    keywords: &ReferenceKeywordSet,
    rule: &SerialRule,
) -> Option<Detection> {
    if recognized.blocks.is_empty() {
        return select_from_transcript(&recognized.text, keywords, rule);
    }

    let blocks: Vec<BlockCandidate<'_>> = recognized
        .blocks
        .iter()
        .filter_map(|block| {
            let bounds = block.bounds?;
            Some(BlockCandidate {
                block,
                bounds,
                has_reference: has_reference_markers(&block.text(), keywords),
            })
        })
        .collect();

    if blocks.is_empty() {
        return None;
    }

    let has_reference_block = blocks.iter().any(|candidate| candidate.has_reference);
    if !has_reference_block && !has_reference_markers(&recognized.text, keywords) {
        return None;
    }

    let mut lines: Vec<LineCandidate> = blocks
        .iter()
        .flat_map(|candidate| {
            candidate.block.lines.iter().filter_map(move |line| {
                let raw = line.text.trim();
                if raw.is_empty() {
                    return None;
                }
                let normalized = normalize_serial(raw);
                if !rule.matches(&normalized) {
                    return None;
                }
                Some(LineCandidate {
                    normalized,
                    bounds: line.bounds,
                    anchor: line.bounds.unwrap_or(candidate.bounds),
                    block_has_reference: candidate.has_reference,
                })
            })
        })
        .collect();

    // Stable: equal bottoms keep recognition order
    lines.sort_by(|a, b| b.anchor.bottom.cmp(&a.anchor.bottom));

    let candidate_count = lines.len();
    let selected = lines.into_iter().find(|line| {
        line.block_has_reference
            || blocks.iter().any(|candidate| {
                candidate.has_reference && candidate.bounds.bottom <= line.anchor.top
            })
    });

    debug!(
        "Serial selection: {} blocks, {} candidates, selected {:?}",
        blocks.len(),
        candidate_count,
        selected.as_ref().map(|line| line.normalized.as_str())
    );

    selected.map(|line| Detection::new(line.normalized, line.bounds))
}

/// Fallback for recognizers that return a bare transcript without blocks
fn select_from_transcript(
    transcript: &str,
    keywords: &ReferenceKeywordSet,
    rule: &SerialRule,
) -> Option<Detection> {
    let transcript = transcript.trim();
    if transcript.is_empty() || !has_reference_markers(transcript, keywords) {
        return None;
    }
    let normalized = normalize_serial(transcript);
    rule.matches(&normalized)
        .then(|| Detection::new(normalized, None))
}
