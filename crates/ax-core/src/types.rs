//! Core data model shared by every component: session addressing, profiles,
//! taint tags, and the message/turn shapes that cross component boundaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Scope of a session address. Threads nest under a channel via `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressScope {
    Dm,
    Group,
    Channel,
    Thread,
    System,
}

impl fmt::Display for AddressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressScope::Dm => "dm",
            AddressScope::Group => "group",
            AddressScope::Channel => "channel",
            AddressScope::Thread => "thread",
            AddressScope::System => "system",
        };
        write!(f, "{s}")
    }
}

/// A structured session identifier. Canonicalises into a stable string key
/// independent of the order identifiers were inserted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAddress {
    pub provider: String,
    pub scope: AddressScope,
    pub identifiers: BTreeMap<String, String>,
    pub parent: Option<Box<SessionAddress>>,
}

impl SessionAddress {
    pub fn new(provider: impl Into<String>, scope: AddressScope) -> Self {
        Self {
            provider: provider.into(),
            scope,
            identifiers: BTreeMap::new(),
            parent: None,
        }
    }

    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: SessionAddress) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Stable string key of the form `provider:scope:id1:id2…`.
    ///
    /// `identifiers` is a `BTreeMap` so iteration order — and therefore the
    /// rendered key — never depends on insertion order.
    pub fn canonical(&self) -> String {
        let mut parts = vec![self.provider.clone(), self.scope.to_string()];
        for (k, v) in &self.identifiers {
            parts.push(format!("{k}={v}"));
        }
        parts.join(":")
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Trust level of content entering the host from a given source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    User,
    External,
    System,
}

/// Provenance tag attached to any content that flows through the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintTag {
    pub source: String,
    pub trust: TrustLevel,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Named bundle of autonomy defaults. `paranoid` is least autonomous,
/// `yolo` is most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Paranoid,
    Balanced,
    Yolo,
}

impl Profile {
    /// Taint-ratio ceiling above which sensitive actions are denied absent
    /// an override.
    pub fn sensitive_threshold(&self) -> f64 {
        match self {
            Profile::Paranoid => 0.10,
            Profile::Balanced => 0.30,
            Profile::Yolo => 0.60,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Profile::Paranoid => "paranoid",
            Profile::Balanced => "balanced",
            Profile::Yolo => "yolo",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paranoid" => Ok(Profile::Paranoid),
            "balanced" => Ok(Profile::Balanced),
            "yolo" => Ok(Profile::Yolo),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Balanced
    }
}

/// A file attachment reference. Never carries inline bytes through the
/// router — only a pointer the agent can fetch separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime: String,
    pub size: u64,
    pub url: String,
}

/// Message arriving at the host from a channel, the scheduler, or the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub session: SessionAddress,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub is_mention: Option<bool>,
}

impl InboundMessage {
    pub fn new(session: SessionAddress, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            session,
            sender: sender.into(),
            content: content.into(),
            attachments: Vec::new(),
            timestamp: chrono::Utc::now(),
            reply_to: None,
            is_mention: None,
        }
    }
}

/// Reply emitted back toward a channel or HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// Deterministic token estimate used uniformly by the taint budget, the
/// compactor, and the proactive-hint budget so none of them disagree about
/// what a "token" costs.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Per-connection / per-agent-invocation identifier (random, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalisation_is_order_independent() {
        let a = SessionAddress::new("http", AddressScope::Channel)
            .with_identifier("guild", "g1")
            .with_identifier("channel", "c1");
        let b = SessionAddress::new("http", AddressScope::Channel)
            .with_identifier("channel", "c1")
            .with_identifier("guild", "g1");
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn thread_differs_from_parent_channel() {
        let parent = SessionAddress::new("http", AddressScope::Channel)
            .with_identifier("channel", "c1");
        let thread = SessionAddress::new("http", AddressScope::Thread)
            .with_identifier("channel", "c1")
            .with_identifier("thread", "t1")
            .with_parent(parent.clone());
        assert_ne!(thread.canonical(), parent.canonical());
    }

    #[test]
    fn token_estimate_is_ceil_div_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
