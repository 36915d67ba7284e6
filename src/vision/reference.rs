//! Reference marker matching
//!
//! A genuine certification code is printed next to a fixed marker (the
//! certifying body's name or mark). Text is only trusted as a serial candidate
//! when one of these markers is visible somewhere in the frame.

use serde::{Deserialize, Serialize};

/// Markers used when the configured set is empty
pub const DEFAULT_REFERENCE_MARKERS: &[&str] = &["SIRIM", "SIRIM QAS", "SIRIM CERTIFIED"];

/// Ordered, normalized, de-duplicated set of reference keywords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ReferenceKeywordSet {
    keywords: Vec<String>,
}

impl ReferenceKeywordSet {
    /// Build a set from raw keywords, dropping blanks and case-insensitive duplicates
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = normalize_for_comparison(keyword.as_ref());
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        Self { keywords: normalized }
    }

    /// The built-in marker set
    pub fn builtin() -> Self {
        Self::new(DEFAULT_REFERENCE_MARKERS.iter().copied())
    }

    /// Keywords as configured, possibly empty
    pub fn configured(&self) -> &[String] {
        &self.keywords
    }

    /// Keywords in effect: the configured ones, or the built-in set when none are configured
    pub fn effective(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            Self::builtin().keywords
        } else {
            self.keywords.clone()
        }
    }

    /// True when nothing is configured and the built-in set applies
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Number of configured keywords
    pub fn len(&self) -> usize {
        self.keywords.len()
    }
}

impl Default for ReferenceKeywordSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl From<Vec<String>> for ReferenceKeywordSet {
    fn from(keywords: Vec<String>) -> Self {
        Self::new(keywords)
    }
}

impl From<ReferenceKeywordSet> for Vec<String> {
    fn from(set: ReferenceKeywordSet) -> Self {
        set.keywords
    }
}

/// Trim, collapse whitespace runs to single spaces and upper-case
pub fn normalize_for_comparison(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Check whether any reference keyword appears in the text
///
/// Blank text never matches. An empty keyword set falls back to the built-in markers.
pub fn has_reference_markers(text: &str, keywords: &ReferenceKeywordSet) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let normalized = normalize_for_comparison(text);
    if keywords.is_empty() {
        return DEFAULT_REFERENCE_MARKERS
            .iter()
            .any(|keyword| normalized.contains(keyword));
    }
    keywords
        .configured()
        .iter()
        .any(|keyword| normalized.contains(keyword.as_str()))
}
