//! Pattern sets are kept separate from the scanning engine so they can be
//! tuned or swapped without touching dispatch logic. The contract the rest
//! of the host depends on is only the verdict alphabet in `lib.rs`.

use regex::Regex;
use std::sync::LazyLock;

/// Input patterns that BLOCK — known prompt-injection families.
pub static INPUT_BLOCK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s+(all\s+|the\s+)?previous\s+instructions",
        r"(?i)disregard\s+(the\s+)?(system|above)\s+prompt",
        r"(?i)you\s+are\s+now\s+(a|an)\s+",
        r"(?i)\[SYSTEM\]",
        r"(?i)override\s+your\s+safety",
        r"(?i)pretend\s+you\s+have\s+no\s+(restrictions|rules|guidelines)",
        r"(?i)reveal\s+your\s+(system\s+)?prompt",
        r"(?i)this\s+is\s+a\s+jailbreak",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});

/// Output patterns that FLAG (never block) — PII-shaped content.
pub static OUTPUT_FLAG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{3}-\d{2}-\d{4}\b",                 // SSN-shaped
        r"\b(?:\d[ -]*?){13,19}\b",                // credit-card-shaped digit run
        r"(?i)api[_-]?key\s*[:=]\s*\S+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});
