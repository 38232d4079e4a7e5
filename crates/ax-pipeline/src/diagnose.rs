//! Maps known stderr fragments from a failed agent process onto short,
//! user-facing hints, per spec.md §4.13 step 12 ("diagnose the error text").
//! Falls back to a generic apology for anything unrecognised — never echoes
//! raw stderr back to the user.

const KNOWN_FRAGMENTS: &[(&str, &str)] = &[
    ("rate limit", "The model provider is rate-limiting requests. Try again shortly."),
    ("429", "The model provider is rate-limiting requests. Try again shortly."),
    ("overloaded", "The model provider is temporarily overloaded. Try again shortly."),
    ("context length", "The conversation is too long for the model's context window."),
    ("timed out", "The agent took too long to respond."),
    ("timeout", "The agent took too long to respond."),
    ("permission denied", "The agent lacked permission to complete this action."),
    ("no such file or directory", "The agent's workspace is missing an expected file."),
    ("out of memory", "The agent ran out of memory while processing this request."),
];

/// Returns a short, actionable sentence derived from stderr text, or a
/// generic fallback when nothing recognisable is present.
pub fn diagnose(stderr_tail: &str) -> String {
    let lower = stderr_tail.to_lowercase();
    for (fragment, hint) in KNOWN_FRAGMENTS {
        if lower.contains(fragment) {
            return hint.to_string();
        }
    }
    "The agent could not complete this request.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_rate_limit_fragment() {
        assert_eq!(
            diagnose("Error: upstream returned 429 rate limit exceeded"),
            "The model provider is rate-limiting requests. Try again shortly."
        );
    }

    #[test]
    fn falls_back_for_unknown_text() {
        assert_eq!(diagnose("panic: index out of bounds"), "The agent could not complete this request.");
    }
}
