//! C1 — strict per-action schema validation of the IPC envelope.
//!
//! Every request the sandbox sends the host over the IPC socket is a JSON
//! object with an `action` field. This module validates shape, charset, and
//! bounds before any handler ever sees the payload: no extra top-level keys,
//! no U+0000 in strings, identifier fields can't traverse paths, UUID/URL
//! fields must actually parse.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Validation failed: {0}")]
    Invalid(String),
}

/// The shape a single field must satisfy.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Any JSON string, U+0000 forbidden.
    Str,
    /// A string that must also forbid `..` and start with an alphanumeric
    /// character (memory scopes, skill names, workspace paths).
    Identifier,
    /// A canonical UUID string.
    Uuid,
    /// An absolute URL string.
    Url,
    /// One of a fixed literal set (checked after normalisation upstream).
    Enum(&'static [&'static str]),
    Number,
    Bool,
    /// A JSON array; element kind validated recursively, shallowly.
    Array(&'static FieldKind),
    /// An opaque JSON object/array whose internal shape this layer does not
    /// police further (e.g. `llm_call.messages[].content` typed blocks).
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionSchema {
    pub required: &'static [FieldSpec],
    pub optional: &'static [FieldSpec],
}

impl ActionSchema {
    fn known_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(|f| f.name)
    }
}

macro_rules! field {
    ($name:expr, $kind:expr) => {
        FieldSpec {
            name: $name,
            kind: $kind,
        }
    };
}

const LLM_CALL: ActionSchema = ActionSchema {
    required: &[field!("messages", FieldKind::Array(&FieldKind::Any))],
    optional: &[
        field!("tools", FieldKind::Any),
        field!("model", FieldKind::Str),
        field!("maxTokens", FieldKind::Number),
        field!("temperature", FieldKind::Number),
    ],
};

const MEMORY_WRITE: ActionSchema = ActionSchema {
    required: &[
        field!("scope", FieldKind::Identifier),
        field!("key", FieldKind::Identifier),
        field!("value", FieldKind::Str),
    ],
    optional: &[],
};
const MEMORY_QUERY: ActionSchema = ActionSchema {
    required: &[field!("scope", FieldKind::Identifier)],
    optional: &[field!("query", FieldKind::Str)],
};
const MEMORY_READ: ActionSchema = ActionSchema {
    required: &[
        field!("scope", FieldKind::Identifier),
        field!("key", FieldKind::Identifier),
    ],
    optional: &[],
};
const MEMORY_DELETE: ActionSchema = MEMORY_READ;
const MEMORY_LIST: ActionSchema = ActionSchema {
    required: &[field!("scope", FieldKind::Identifier)],
    optional: &[],
};

const WEB_FETCH: ActionSchema = ActionSchema {
    required: &[field!("url", FieldKind::Url)],
    optional: &[],
};
const WEB_SEARCH: ActionSchema = ActionSchema {
    required: &[field!("query", FieldKind::Str)],
    optional: &[],
};

const AUDIT_QUERY: ActionSchema = ActionSchema {
    required: &[],
    optional: &[field!("sessionId", FieldKind::Str), field!("limit", FieldKind::Number)],
};

const SKILL_LIST: ActionSchema = ActionSchema {
    required: &[],
    optional: &[],
};
const SKILL_READ: ActionSchema = ActionSchema {
    required: &[field!("name", FieldKind::Identifier)],
    optional: &[],
};
const SKILL_PROPOSE: ActionSchema = ActionSchema {
    required: &[
        field!("name", FieldKind::Identifier),
        field!("content", FieldKind::Str),
    ],
    optional: &[field!("reason", FieldKind::Str)],
};

const IDENTITY_WRITE: ActionSchema = ActionSchema {
    required: &[
        field!("file", FieldKind::Str),
        field!("content", FieldKind::Str),
    ],
    optional: &[field!("origin", FieldKind::Str), field!("reason", FieldKind::Str)],
};
const IDENTITY_PROPOSE: ActionSchema = IDENTITY_WRITE;

const USER_WRITE: ActionSchema = ActionSchema {
    required: &[
        field!("userId", FieldKind::Identifier),
        field!("content", FieldKind::Str),
    ],
    optional: &[],
};

const PROPOSAL_LIST: ActionSchema = ActionSchema {
    required: &[],
    optional: &[],
};
const PROPOSAL_REVIEW: ActionSchema = ActionSchema {
    required: &[
        field!("proposalId", FieldKind::Uuid),
        field!("decision", FieldKind::Enum(&["approved", "rejected"])),
    ],
    optional: &[field!("reason", FieldKind::Str)],
};

const WORKSPACE_WRITE: ActionSchema = ActionSchema {
    required: &[
        field!("tier", FieldKind::Enum(&["agent", "user", "scratch"])),
        field!("path", FieldKind::Identifier),
        field!("content", FieldKind::Str),
    ],
    optional: &[],
};
const WORKSPACE_READ: ActionSchema = ActionSchema {
    required: &[
        field!("tier", FieldKind::Enum(&["agent", "user", "scratch"])),
        field!("path", FieldKind::Identifier),
    ],
    optional: &[],
};
const WORKSPACE_LIST: ActionSchema = ActionSchema {
    required: &[field!("tier", FieldKind::Enum(&["agent", "user", "scratch"]))],
    optional: &[field!("path", FieldKind::Identifier)],
};

const SCHEDULER_ADD_CRON: ActionSchema = ActionSchema {
    required: &[
        field!("name", FieldKind::Identifier),
        field!("expression", FieldKind::Str),
        field!("action", FieldKind::Any),
    ],
    optional: &[field!("runOnce", FieldKind::Bool)],
};
const SCHEDULER_RUN_AT: ActionSchema = ActionSchema {
    required: &[
        field!("name", FieldKind::Identifier),
        field!("fireAt", FieldKind::Str),
        field!("action", FieldKind::Any),
    ],
    optional: &[],
};
const SCHEDULER_REMOVE_CRON: ActionSchema = ActionSchema {
    required: &[field!("id", FieldKind::Uuid)],
    optional: &[],
};
const SCHEDULER_LIST_JOBS: ActionSchema = ActionSchema {
    required: &[],
    optional: &[],
};

const AGENT_REGISTRY_LIST: ActionSchema = ActionSchema {
    required: &[],
    optional: &[],
};
const AGENT_REGISTRY_GET: ActionSchema = ActionSchema {
    required: &[field!("id", FieldKind::Identifier)],
    optional: &[],
};

static REGISTRY: LazyLock<HashMap<&'static str, ActionSchema>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert("llm_call", LLM_CALL);
    m.insert("memory_write", MEMORY_WRITE);
    m.insert("memory_query", MEMORY_QUERY);
    m.insert("memory_read", MEMORY_READ);
    m.insert("memory_delete", MEMORY_DELETE);
    m.insert("memory_list", MEMORY_LIST);
    m.insert("web_fetch", WEB_FETCH);
    m.insert("web_search", WEB_SEARCH);
    m.insert("audit_query", AUDIT_QUERY);
    m.insert("skill_list", SKILL_LIST);
    m.insert("skill_read", SKILL_READ);
    m.insert("skill_propose", SKILL_PROPOSE);
    m.insert("identity_write", IDENTITY_WRITE);
    m.insert("identity_propose", IDENTITY_PROPOSE);
    m.insert("user_write", USER_WRITE);
    m.insert("proposal_list", PROPOSAL_LIST);
    m.insert("proposal_review", PROPOSAL_REVIEW);
    m.insert("workspace_write", WORKSPACE_WRITE);
    m.insert("workspace_read", WORKSPACE_READ);
    m.insert("workspace_list", WORKSPACE_LIST);
    m.insert("scheduler_add_cron", SCHEDULER_ADD_CRON);
    m.insert("scheduler_run_at", SCHEDULER_RUN_AT);
    m.insert("scheduler_remove_cron", SCHEDULER_REMOVE_CRON);
    m.insert("scheduler_list_jobs", SCHEDULER_LIST_JOBS);
    m.insert("agent_registry_list", AGENT_REGISTRY_LIST);
    m.insert("agent_registry_get", AGENT_REGISTRY_GET);
    m
});

/// Validate a request envelope for the given action. `payload` is the JSON
/// object including the `action` key itself.
pub fn validate(action: &str, payload: &Value) -> Result<(), SchemaError> {
    let schema = REGISTRY
        .get(action)
        .ok_or_else(|| SchemaError::UnknownAction(action.to_string()))?;

    let obj = payload
        .as_object()
        .ok_or_else(|| SchemaError::Invalid("envelope must be a JSON object".to_string()))?;

    // Strict mode: no top-level keys beyond "action" and the schema's own fields.
    let known: std::collections::HashSet<&str> = schema.known_fields().chain(["action"]).collect();
    for key in obj.keys() {
        if !known.contains(key.as_str()) {
            return Err(SchemaError::Invalid(format!("unexpected field: {key}")));
        }
    }

    for f in schema.required {
        let value = obj
            .get(f.name)
            .ok_or_else(|| SchemaError::Invalid(format!("missing required field: {}", f.name)))?;
        validate_field(f.name, &f.kind, value)?;
    }
    for f in schema.optional {
        if let Some(value) = obj.get(f.name) {
            validate_field(f.name, &f.kind, value)?;
        }
    }

    if action == "llm_call" {
        validate_message_roles(obj.get("messages").expect("required"))?;
    }

    Ok(())
}

const MESSAGE_ROLES: &[&str] = &["user", "assistant", "system", "toolResult"];

/// `llm_call.messages[].role` is checked separately from the generic field
/// walk above because it's the one nested-object shape the envelope needs
/// policed beyond "is an array".
fn validate_message_roles(messages: &Value) -> Result<(), SchemaError> {
    for (i, msg) in messages.as_array().into_iter().flatten().enumerate() {
        let role = msg
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::Invalid(format!("messages[{i}].role is required")))?;
        if !MESSAGE_ROLES.contains(&role) {
            return Err(SchemaError::Invalid(format!(
                "messages[{i}].role must be one of {MESSAGE_ROLES:?}"
            )));
        }
    }
    Ok(())
}

fn validate_field(name: &str, kind: &FieldKind, value: &Value) -> Result<(), SchemaError> {
    match kind {
        FieldKind::Str | FieldKind::Identifier => {
            let s = value
                .as_str()
                .ok_or_else(|| SchemaError::Invalid(format!("{name} must be a string")))?;
            if s.contains('\u{0000}') {
                return Err(SchemaError::Invalid(format!("{name} contains a null byte")));
            }
            if matches!(kind, FieldKind::Identifier) {
                if s.contains("..") {
                    return Err(SchemaError::Invalid(format!("{name} contains '..'")));
                }
                match s.chars().next() {
                    Some(c) if c.is_alphanumeric() => {}
                    _ => {
                        return Err(SchemaError::Invalid(format!(
                            "{name} must start with an alphanumeric character"
                        )))
                    }
                }
            }
            Ok(())
        }
        FieldKind::Uuid => {
            let s = value
                .as_str()
                .ok_or_else(|| SchemaError::Invalid(format!("{name} must be a string")))?;
            uuid::Uuid::parse_str(s)
                .map(|_| ())
                .map_err(|_| SchemaError::Invalid(format!("{name} is not a canonical UUID")))
        }
        FieldKind::Url => {
            let s = value
                .as_str()
                .ok_or_else(|| SchemaError::Invalid(format!("{name} must be a string")))?;
            url::Url::parse(s)
                .map(|_| ())
                .map_err(|_| SchemaError::Invalid(format!("{name} is not an absolute URL")))
        }
        FieldKind::Enum(options) => {
            let s = value
                .as_str()
                .ok_or_else(|| SchemaError::Invalid(format!("{name} must be a string")))?;
            if options.contains(&s) {
                Ok(())
            } else {
                Err(SchemaError::Invalid(format!("{name} must be one of {options:?}")))
            }
        }
        FieldKind::Number => {
            if value.is_number() {
                Ok(())
            } else {
                Err(SchemaError::Invalid(format!("{name} must be a number")))
            }
        }
        FieldKind::Bool => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(SchemaError::Invalid(format!("{name} must be a boolean")))
            }
        }
        FieldKind::Array(elem) => {
            let arr = value
                .as_array()
                .ok_or_else(|| SchemaError::Invalid(format!("{name} must be an array")))?;
            if arr.is_empty() && name == "messages" {
                return Err(SchemaError::Invalid("messages must contain at least one entry".to_string()));
            }
            for item in arr {
                validate_field(name, elem, item)?;
            }
            Ok(())
        }
        FieldKind::Any => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_unknown_top_level_key() {
        let payload = json!({"action": "skill_list", "extra": 1});
        assert!(matches!(validate("skill_list", &payload), Err(SchemaError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_action() {
        let payload = json!({"action": "nope"});
        assert_eq!(validate("nope", &payload), Err(SchemaError::UnknownAction("nope".into())));
    }

    #[test]
    fn rejects_null_byte() {
        let payload = json!({"action": "skill_read", "name": "ab\u{0}c"});
        assert!(validate("skill_read", &payload).is_err());
    }

    #[test]
    fn rejects_path_traversal_identifier() {
        let payload = json!({"action": "skill_read", "name": "../../etc/passwd"});
        assert!(validate("skill_read", &payload).is_err());
    }

    #[test]
    fn rejects_non_alphanumeric_leading_char() {
        let payload = json!({"action": "skill_read", "name": "_secret"});
        assert!(validate("skill_read", &payload).is_err());
    }

    #[test]
    fn accepts_valid_llm_call() {
        let payload = json!({"action": "llm_call", "messages": [{"role": "user", "content": "hi"}]});
        assert!(validate("llm_call", &payload).is_ok());
    }

    #[test]
    fn rejects_bad_uuid() {
        let payload = json!({"action": "proposal_review", "proposalId": "not-a-uuid", "decision": "approved"});
        assert!(validate("proposal_review", &payload).is_err());
    }

    #[test]
    fn rejects_relative_url() {
        let payload = json!({"action": "web_fetch", "url": "/etc/passwd"});
        assert!(validate("web_fetch", &payload).is_err());
    }
}
