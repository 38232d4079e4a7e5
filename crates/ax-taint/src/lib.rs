//! C4 — per-session tainted-token accounting plus a sensitive-action gate
//! with user override. Grounded on the host's permission-check pattern: a
//! pure, pattern-matchable result enum produced by a function that never
//! mutates anything it doesn't own.

use ax_core::types::{estimate_tokens, Profile};
use dashmap::DashMap;

/// Actions gated by taint ratio unless an override has been recorded.
pub const DEFAULT_SENSITIVE_ACTIONS: &[&str] = &[
    "oauth_call",
    "skill_propose",
    "browser_navigate",
    "scheduler_add_cron",
    "identity_propose",
];

#[derive(Debug, Clone, Default)]
struct TaintState {
    total_tokens: u64,
    tainted_tokens: u64,
}

impl TaintState {
    fn ratio(&self) -> f64 {
        self.tainted_tokens as f64 / (self.total_tokens.max(1)) as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub taint_ratio: f64,
    pub threshold: f64,
}

/// Per-session taint counters and sensitive-action overrides. Sessions and
/// overrides are distinct maps so `end_session` can drop both independently.
pub struct TaintBudget {
    sessions: DashMap<String, TaintState>,
    overrides: DashMap<(String, String), ()>,
    sensitive_actions: Vec<String>,
}

impl TaintBudget {
    pub fn new() -> Self {
        Self::with_sensitive_actions(DEFAULT_SENSITIVE_ACTIONS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_sensitive_actions(sensitive_actions: Vec<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            overrides: DashMap::new(),
            sensitive_actions,
        }
    }

    fn is_sensitive(&self, action: &str) -> bool {
        self.sensitive_actions.iter().any(|a| a == action)
    }

    /// Updates token counters unconditionally. Callers must invoke this
    /// before `check_action` for the current piece of content regardless of
    /// whether the subsequent check passes — usage is recorded even for
    /// requests that are ultimately denied.
    pub fn record_content(&self, session: &str, text: &str, is_tainted: bool) {
        let mut state = self.sessions.entry(session.to_string()).or_default();
        let tokens = estimate_tokens(text);
        state.total_tokens += tokens;
        if is_tainted {
            state.tainted_tokens += tokens;
        }
    }

    pub fn check_action(&self, session: &str, action: &str, profile: Profile) -> ActionCheck {
        let threshold = profile.sensitive_threshold();
        let ratio = self
            .sessions
            .get(session)
            .map(|s| s.ratio())
            .unwrap_or(0.0);

        if !self.is_sensitive(action) {
            return ActionCheck {
                allowed: true,
                reason: None,
                taint_ratio: ratio,
                threshold,
            };
        }

        if ratio <= threshold {
            return ActionCheck {
                allowed: true,
                reason: None,
                taint_ratio: ratio,
                threshold,
            };
        }

        if self.overrides.contains_key(&(session.to_string(), action.to_string())) {
            return ActionCheck {
                allowed: true,
                reason: None,
                taint_ratio: ratio,
                threshold,
            };
        }

        ActionCheck {
            allowed: false,
            reason: Some(format!(
                "taint ratio {ratio:.2} exceeds threshold {threshold:.2} for sensitive action {action}"
            )),
            taint_ratio: ratio,
            threshold,
        }
    }

    pub fn add_user_override(&self, session: &str, action: &str) {
        self.overrides.insert((session.to_string(), action.to_string()), ());
    }

    pub fn end_session(&self, session: &str) {
        self.sessions.remove(session);
        self.overrides.retain(|(s, _), _| s != session);
    }
}

impl Default for TaintBudget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tainted_never_exceeds_total() {
        let budget = TaintBudget::new();
        budget.record_content("s1", "hello", false);
        budget.record_content("s1", "world", true);
        let check = budget.check_action("s1", "skill_propose", Profile::Balanced);
        assert!(check.taint_ratio <= 1.0);
    }

    #[test]
    fn ratio_under_threshold_allows_sensitive_action() {
        let budget = TaintBudget::new();
        budget.record_content("s1", &"a".repeat(4000), false);
        let check = budget.check_action("s1", "skill_propose", Profile::Balanced);
        assert!(check.allowed);
    }

    #[test]
    fn ratio_over_threshold_denies_without_override() {
        let budget = TaintBudget::new();
        budget.record_content("s1", &"a".repeat(800), false);
        budget.record_content("s1", &"b".repeat(3200), true);
        let check = budget.check_action("s1", "skill_propose", Profile::Balanced);
        assert!(!check.allowed);
    }

    #[test]
    fn override_allows_action_regardless_of_ratio() {
        let budget = TaintBudget::new();
        budget.record_content("s1", &"a".repeat(800), false);
        budget.record_content("s1", &"b".repeat(3200), true);
        budget.add_user_override("s1", "skill_propose");
        let check = budget.check_action("s1", "skill_propose", Profile::Balanced);
        assert!(check.allowed);
    }

    #[test]
    fn non_sensitive_actions_are_always_allowed() {
        let budget = TaintBudget::new();
        budget.record_content("s1", &"b".repeat(10_000), true);
        let check = budget.check_action("s1", "memory_read", Profile::Paranoid);
        assert!(check.allowed);
    }

    #[test]
    fn end_session_clears_both_maps() {
        let budget = TaintBudget::new();
        budget.record_content("s1", "tainted", true);
        budget.add_user_override("s1", "skill_propose");
        budget.end_session("s1");
        let check = budget.check_action("s1", "skill_propose", Profile::Paranoid);
        // fresh session: zero taint, no override recorded anymore but ratio 0 <= threshold anyway
        assert_eq!(check.taint_ratio, 0.0);
        assert!(!budget.overrides.contains_key(&("s1".to_string(), "skill_propose".to_string())));
    }
}
