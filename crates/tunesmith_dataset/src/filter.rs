//! Content/safety heuristics for incoming documents.
//!
//! Fast checks before a document is allowed into a training set:
//! length bounds, simple prompt-injection patterns, and a rough PII
//! sweep (emails, phone numbers, IBANs). Each triggered rule adds a
//! penalty; a document is rejected once the accumulated penalty crosses
//! the cutoff. Not a moderation system and no PII guarantee.

use regex::Regex;

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 32_000;
const REJECT_PENALTY: f64 = 0.4;

/// Outcome of one assessment.
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub accept: bool,
    /// Triggered rule names.
    pub reasons: Vec<String>,
    /// Rough quality estimate in [0, 1]: 1 minus accumulated penalty.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    min_length: usize,
    max_length: usize,
    injection_patterns: Vec<Regex>,
    pii_patterns: Vec<(&'static str, Regex)>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::with_limits(MIN_LENGTH, MAX_LENGTH)
    }

    pub fn with_limits(min_length: usize, max_length: usize) -> Self {
        let injection_patterns = [
            r"(?i)ignore\s+previous\s+instructions",
            r"(?i)disregard\s+all\s+prior",
            r"(?i)system\s*:\s*",
            r"(?i)you\s+are\s+now\s+.*model",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid injection pattern"))
        .collect();

        let pii_patterns = vec![
            (
                "email",
                Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                    .expect("invalid email pattern"),
            ),
            (
                "phone",
                Regex::new(r"\b(?:\+\d{1,3}[ -]?)?(?:\d[ -]?){8,14}\b")
                    .expect("invalid phone pattern"),
            ),
            (
                "iban",
                Regex::new(r"\b[A-Z]{2}[0-9A-Z]{13,30}\b").expect("invalid iban pattern"),
            ),
        ];

        Self {
            min_length,
            max_length,
            injection_patterns,
            pii_patterns,
        }
    }

    /// Assess one document body.
    pub fn assess(&self, text: &str) -> FilterVerdict {
        let mut reasons = Vec::new();
        let mut penalty = 0.0;

        let length = text.len();
        if length < self.min_length {
            reasons.push("too_short".to_string());
            penalty += 0.5;
        }
        if length > self.max_length {
            reasons.push("too_long".to_string());
            penalty += 0.3;
        }

        if self.injection_patterns.iter().any(|p| p.is_match(text)) {
            reasons.push("prompt_injection".to_string());
            penalty += 0.5;
        }

        for (name, pattern) in &self.pii_patterns {
            if pattern.is_match(text) {
                reasons.push(format!("pii_{}", name));
                penalty += 0.2;
            }
        }

        FilterVerdict {
            accept: penalty < REJECT_PENALTY,
            reasons,
            score: (1.0 - penalty).max(0.0),
        }
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}
