//! Detection patterns used by the guardrail checks.
//!
//! Only pattern names and match counts ever leave this module; matched text
//! is never returned, so callers cannot log it by accident.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// IBAN-like account number (country code, check digits, BBAN).
    pub static ref ACCOUNT_NUMBER_PATTERN: Regex = Regex::new(
        r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b"
    ).unwrap();

    /// Credit card number (16 digits with optional separators)
    pub static ref CREDIT_CARD_PATTERN: Regex = Regex::new(
        r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b"
    ).unwrap();

    /// National identifier in the XXX-XX-XXXX layout.
    pub static ref NATIONAL_ID_PATTERN: Regex = Regex::new(
        r"\b\d{3}-\d{2}-\d{4}\b"
    ).unwrap();

    /// Passport-like document number.
    pub static ref PASSPORT_PATTERN: Regex = Regex::new(
        r"\b[A-Z]{1,2}\d{6,9}\b"
    ).unwrap();

    /// Email address pattern (RFC 5322 simplified)
    pub static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    /// Phone number (with optional country code)
    pub static ref PHONE_PATTERN: Regex = Regex::new(
        r"(?:\+?1[-.\s]?)?(?:\([0-9]{3}\)|[0-9]{3})[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b"
    ).unwrap();

    /// Phrases signalling the model could not reach a conclusion.
    pub static ref UNCERTAINTY_PATTERN: Regex = Regex::new(
        r"(?i)\b(i don't know|i'm not sure|unable to determine|cannot assess|unknown|n/a)(?:\b|$)"
    ).unwrap();

    /// Uncertainty lexicon for stored-record validation; also catches failure words.
    pub static ref VALIDATION_UNCERTAINTY_PATTERN: Regex = Regex::new(
        r"(?i)\b(i don't know|i'm not sure|unable to determine|cannot assess|unknown|n/a|error|failed)(?:\b|$)"
    ).unwrap();
}

/// Sensitive identifier patterns, in reporting order.
pub fn sensitive_patterns() -> [(&'static str, &'static Regex); 6] {
    [
        ("account_number", &*ACCOUNT_NUMBER_PATTERN),
        ("credit_card", &*CREDIT_CARD_PATTERN),
        ("national_id", &*NATIONAL_ID_PATTERN),
        ("passport", &*PASSPORT_PATTERN),
        ("email", &*EMAIL_PATTERN),
        ("phone", &*PHONE_PATTERN),
    ]
}

/// Count matches per sensitive pattern. Patterns with no match are omitted.
pub fn scan_sensitive(content: &str) -> Vec<(&'static str, usize)> {
    sensitive_patterns()
        .into_iter()
        .filter_map(|(name, pattern)| {
            let count = pattern.find_iter(content).count();
            (count > 0).then_some((name, count))
        })
        .collect()
}

/// First uncertainty phrase found, lowercased.
pub fn find_uncertainty(content: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}
