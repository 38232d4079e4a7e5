//! C2 — static provider allowlist. No string the caller supplies ever flows
//! into a filesystem path; every allowed `(kind, name)` pair is enumerated
//! ahead of time and resolved to an opaque module id.

use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown provider kind/name: {kind}/{name}")]
pub struct UnknownProvider {
    pub kind: String,
    pub name: String,
}

static PROVIDER_MAP: LazyLock<HashMap<&'static str, HashMap<&'static str, &'static str>>> =
    LazyLock::new(|| {
        let mut m = HashMap::new();

        let mut llm = HashMap::new();
        llm.insert("anthropic", "provider::anthropic");
        m.insert("llm", llm);

        let mut memory = HashMap::new();
        memory.insert("sqlite", "memory::sqlite");
        m.insert("memory", memory);

        let mut web = HashMap::new();
        web.insert("http", "web::http");
        m.insert("web", web);

        m
    });

/// Look up the module id for a `(kind, name)` pair. Fails closed on anything
/// not explicitly enumerated above.
pub fn resolve_provider_path(kind: &str, name: &str) -> Result<&'static str, UnknownProvider> {
    PROVIDER_MAP
        .get(kind)
        .and_then(|names| names.get(name))
        .copied()
        .ok_or_else(|| UnknownProvider {
            kind: kind.to_string(),
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_provider() {
        assert_eq!(resolve_provider_path("llm", "anthropic").unwrap(), "provider::anthropic");
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(resolve_provider_path("llm", "../../etc/passwd").is_err());
        assert!(resolve_provider_path("nope", "anthropic").is_err());
    }
}
