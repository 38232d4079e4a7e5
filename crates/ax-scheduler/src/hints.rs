//! Proactive hints: a memory provider publishes `{source, kind, reason,
//! suggestedPrompt, confidence, scope}` and the gate decides whether to
//! dispatch it as an inbound message, suppress it with a reason, or queue it
//! as budget-blocked pending work.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveHint {
    pub source: String,
    pub kind: String,
    pub reason: String,
    pub suggested_prompt: String,
    pub confidence: f64,
    pub scope: String,
}

impl ProactiveHint {
    /// Identity used for cooldown/dedup purposes: hints with the same
    /// source+kind+reason are considered "the same hint" firing again.
    fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.source, self.kind, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Fire,
    Suppressed(String),
    Pending,
}

/// Tracks cooldowns and remaining token budget across hint evaluations.
/// One instance per running agent/session.
pub struct HintGate {
    cooldowns: DashMap<String, Instant>,
    remaining_budget: Mutex<u64>,
    pending: Mutex<Vec<ProactiveHint>>,
    confidence_threshold: f64,
    cooldown: Duration,
}

impl HintGate {
    pub fn new(confidence_threshold: f64, cooldown_sec: u64, token_budget: u64) -> Self {
        Self {
            cooldowns: DashMap::new(),
            remaining_budget: Mutex::new(token_budget),
            pending: Mutex::new(Vec::new()),
            confidence_threshold,
            cooldown: Duration::from_secs(cooldown_sec),
        }
    }

    /// Evaluate `hint` against the active-hours flag and current gate state.
    /// Does not mutate cooldown/budget state — call [`Self::record_fired`] or
    /// [`Self::record_token_usage`] once the caller actually dispatches it.
    pub fn evaluate(&self, hint: &ProactiveHint, inside_active_hours: bool) -> Decision {
        if hint.confidence < self.confidence_threshold {
            let reason = format!(
                "confidence {:.2} below threshold {:.2}",
                hint.confidence, self.confidence_threshold
            );
            log_suppressed(hint, &reason);
            return Decision::Suppressed(reason);
        }
        if !inside_active_hours {
            let reason = "outside active hours".to_string();
            log_suppressed(hint, &reason);
            return Decision::Suppressed(reason);
        }
        if let Some(last) = self.cooldowns.get(&hint.dedup_key()) {
            if last.elapsed() < self.cooldown {
                let reason = format!("identical hint fired within cooldown ({:?} remaining)", self.cooldown - last.elapsed());
                log_suppressed(hint, &reason);
                return Decision::Suppressed(reason);
            }
        }
        let remaining = *self.remaining_budget.lock().unwrap();
        if remaining == 0 {
            let reason = "token budget exhausted".to_string();
            log_suppressed(hint, &reason);
            self.pending.lock().unwrap().push(hint.clone());
            return Decision::Pending;
        }
        Decision::Fire
    }

    /// Mark `hint` as having just fired, starting its cooldown window.
    pub fn record_fired(&self, hint: &ProactiveHint) {
        self.cooldowns.insert(hint.dedup_key(), Instant::now());
    }

    /// Decrement the remaining token budget by `n`, floored at zero.
    pub fn record_token_usage(&self, n: u64) {
        let mut remaining = self.remaining_budget.lock().unwrap();
        *remaining = remaining.saturating_sub(n);
    }

    /// Hints that were budget-blocked and are waiting for budget to free up.
    pub fn list_pending_hints(&self) -> Vec<ProactiveHint> {
        self.pending.lock().unwrap().clone()
    }

    /// Clear the pending queue, e.g. once budget resets for a new period.
    pub fn clear_pending(&self) {
        self.pending.lock().unwrap().clear();
    }

    pub fn remaining_budget(&self) -> u64 {
        *self.remaining_budget.lock().unwrap()
    }
}

fn log_suppressed(hint: &ProactiveHint, reason: &str) {
    info!(
        source = %hint.source,
        kind = %hint.kind,
        %reason,
        "hint_suppressed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(confidence: f64) -> ProactiveHint {
        ProactiveHint {
            source: "memory".to_string(),
            kind: "followup".to_string(),
            reason: "user asked to be reminded".to_string(),
            suggested_prompt: "Check in on the migration".to_string(),
            confidence,
            scope: "session-1".to_string(),
        }
    }

    #[test]
    fn low_confidence_is_suppressed() {
        let gate = HintGate::new(0.7, 3600, 1000);
        let decision = gate.evaluate(&hint(0.5), true);
        assert!(matches!(decision, Decision::Suppressed(_)));
    }

    #[test]
    fn outside_active_hours_is_suppressed() {
        let gate = HintGate::new(0.7, 3600, 1000);
        let decision = gate.evaluate(&hint(0.9), false);
        assert!(matches!(decision, Decision::Suppressed(_)));
    }

    #[test]
    fn fires_when_all_conditions_hold() {
        let gate = HintGate::new(0.7, 3600, 1000);
        assert_eq!(gate.evaluate(&hint(0.9), true), Decision::Fire);
    }

    #[test]
    fn cooldown_suppresses_repeat_firing() {
        let gate = HintGate::new(0.7, 3600, 1000);
        let h = hint(0.9);
        assert_eq!(gate.evaluate(&h, true), Decision::Fire);
        gate.record_fired(&h);
        assert!(matches!(gate.evaluate(&h, true), Decision::Suppressed(_)));
    }

    #[test]
    fn exhausted_budget_queues_as_pending() {
        let gate = HintGate::new(0.7, 3600, 100);
        gate.record_token_usage(100);
        let h = hint(0.9);
        assert_eq!(gate.evaluate(&h, true), Decision::Pending);
        assert_eq!(gate.list_pending_hints().len(), 1);
    }
}
