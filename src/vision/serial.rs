//! Serial code normalization and validation

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strict certification label form: `T`, two letters, seven digits
static CERTIFICATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^T[A-Z]{2}[0-9]{7}$")
        .unwrap_or_else(|e| panic!("Failed to compile certification pattern: {e}"))
});

/// Loose form: any alphanumeric run of at least six characters
static ALPHANUMERIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9]{6,}$")
        .unwrap_or_else(|e| panic!("Failed to compile alphanumeric pattern: {e}"))
});

/// Persistable choice of serial rule
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialRuleSetting {
    /// `^T[A-Z]{2}\d{7}$`
    #[default]
    Certification,
    /// `^[A-Z0-9]{6,}$`
    Alphanumeric,
    /// Caller-supplied regular expression
    Pattern(String),
}

/// Errors raised while building a serial rule
#[derive(Debug, Error)]
pub enum SerialRuleError {
    #[error("invalid serial pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Structural rule a normalized serial must satisfy
#[derive(Debug, Clone, Default)]
pub enum SerialRule {
    #[default]
    Certification,
    Alphanumeric,
    Pattern(Regex),
}

impl SerialRule {
    /// Compile a custom pattern
    pub fn pattern(pattern: &str) -> Result<Self, SerialRuleError> {
        Regex::new(pattern)
            .map(SerialRule::Pattern)
            .map_err(|source| SerialRuleError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Build the rule described by a setting
    pub fn from_setting(setting: &SerialRuleSetting) -> Result<Self, SerialRuleError> {
        match setting {
            SerialRuleSetting::Certification => Ok(SerialRule::Certification),
            SerialRuleSetting::Alphanumeric => Ok(SerialRule::Alphanumeric),
            SerialRuleSetting::Pattern(pattern) => Self::pattern(pattern),
        }
    }

    /// Test already-normalized text against the rule
    pub fn matches(&self, normalized: &str) -> bool {
        if normalized.is_empty() {
            return false;
        }
        match self {
            SerialRule::Certification => CERTIFICATION_REGEX.is_match(normalized),
            SerialRule::Alphanumeric => ALPHANUMERIC_REGEX.is_match(normalized),
            SerialRule::Pattern(regex) => regex.is_match(normalized),
        }
    }

    /// Human readable form of the rule
    pub fn describe(&self) -> String {
        match self {
            SerialRule::Certification => CERTIFICATION_REGEX.as_str().to_string(),
            SerialRule::Alphanumeric => ALPHANUMERIC_REGEX.as_str().to_string(),
            SerialRule::Pattern(regex) => regex.as_str().to_string(),
        }
    }
}

/// Remove whitespace and hyphens, then upper-case
pub fn normalize_serial(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// Normalize then validate in one step
pub fn matches_serial_pattern(text: &str, rule: &SerialRule) -> bool {
    rule.matches(&normalize_serial(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_serial() {
        assert_eq!(normalize_serial(" tab-123 4567 "), "TAB1234567");
        assert_eq!(normalize_serial("a\tb-c"), "ABC");
        assert_eq!(normalize_serial(""), "");
    }

    #[test]
    fn test_normalize_serial_idempotent() {
        let samples = [
            "tab 123-4567",
            "  -\t-x ",
            "ß-straße",
            "Tqa 0000001\n",
            "---",
            "mixed Case 12-34",
        ];
        for sample in samples {
            let once = normalize_serial(sample);
            assert_eq!(normalize_serial(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_certification_rule() {
        let rule = SerialRule::Certification;
        assert!(rule.matches("TAB1234567"));
        assert!(!rule.matches("XAB1234567"));
        assert!(!rule.matches("TAB123456"));
        assert!(!rule.matches("TA11234567"));
        assert!(!rule.matches(""));
        assert!(matches_serial_pattern("tab-123 4567", &rule));
    }

    #[test]
    fn test_alphanumeric_rule() {
        let rule = SerialRule::Alphanumeric;
        assert!(rule.matches("ABC123"));
        assert!(rule.matches("TAB1234567"));
        assert!(!rule.matches("AB12"));
        assert!(!rule.matches("ABC_123"));
    }

    #[test]
    fn test_custom_pattern_rule() {
        let rule = SerialRule::pattern(r"^SN[0-9]{4}$").unwrap();
        assert!(rule.matches("SN0042"));
        assert!(!rule.matches("SN42"));
        assert_eq!(rule.describe(), r"^SN[0-9]{4}$");
    }

    #[test]
    fn test_empty_never_matches_custom_pattern() {
        let rule = SerialRule::pattern(r"^.*$").unwrap();
        assert!(!rule.matches(""));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = SerialRule::from_setting(&SerialRuleSetting::Pattern("([A-Z".to_string()));
        assert!(matches!(result, Err(SerialRuleError::InvalidPattern { .. })));
    }

    #[test]
    fn test_rule_from_setting() {
        assert!(matches!(
            SerialRule::from_setting(&SerialRuleSetting::default()).unwrap(),
            SerialRule::Certification
        ));
        assert!(matches!(
            SerialRule::from_setting(&SerialRuleSetting::Alphanumeric).unwrap(),
            SerialRule::Alphanumeric
        ));
    }
}
