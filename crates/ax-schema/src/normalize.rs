//! §4.9 — input normalisation.
//!
//! Agent messages may carry enum-valued fields produced by weaker models.
//! These normalisers run *before* strict enum validation so near-miss values
//! ("UserRequest", "user-request") still match, while genuinely unknown
//! values fall through to the registry's enum check and get rejected.

/// Lower-case, collapse non-alphanumerics to `_`, then match by substring
/// against the two known origins. Defaults to `user_request`.
pub fn normalize_origin(raw: &str) -> &'static str {
    let normalized = collapse(raw);
    if normalized.contains("agent") {
        "agent_initiated"
    } else {
        "user_request"
    }
}

/// Lower-case and map through the known identity file aliases. Anything
/// else passes through unchanged for the strict enum check to reject.
pub fn normalize_identity_file(raw: &str) -> String {
    let lower = raw.to_lowercase();
    match lower.as_str() {
        "soul" | "soul.md" => "SOUL.md".to_string(),
        "identity" | "identity.md" => "IDENTITY.md".to_string(),
        "user" | "user.md" => "USER.md".to_string(),
        _ => raw.to_string(),
    }
}

fn collapse(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_matches_by_substring() {
        assert_eq!(normalize_origin("Agent-Initiated"), "agent_initiated");
        assert_eq!(normalize_origin("User Request"), "user_request");
        assert_eq!(normalize_origin("garbage"), "user_request");
    }

    #[test]
    fn identity_file_aliases_map() {
        assert_eq!(normalize_identity_file("Soul"), "SOUL.md");
        assert_eq!(normalize_identity_file("identity.md"), "IDENTITY.md");
        assert_eq!(normalize_identity_file("USER"), "USER.md");
        assert_eq!(normalize_identity_file("BOOTSTRAP.md"), "BOOTSTRAP.md");
    }
}
