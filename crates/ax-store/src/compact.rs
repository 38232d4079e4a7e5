//! C7 — history compaction. Re-implemented from spec.md §4.6: a turn-count
//! gate *and* a token-threshold gate, not turn-count alone. The compactor
//! never talks to IPC directly — the pipeline supplies an `LlmCall` closure
//! so this crate stays free of an IPC dependency.

use async_trait::async_trait;
use ax_core::types::{estimate_tokens, TurnRole};
use tracing::warn;

use crate::types::ConversationTurn;

pub const KEEP_RECENT_TURNS: usize = 6;
pub const COMPACTION_THRESHOLD: f64 = 0.75;

const SUMMARY_INSTRUCTION: &str = "Summarise the following conversation turns. \
Preserve key facts, decisions, and code references. Be concise but do not \
drop anything a later turn might depend on.";

/// Injected by the pipeline: makes one `llm_call` over IPC and returns the
/// assistant's text, or an error if the call failed.
#[async_trait]
pub trait LlmCall: Send + Sync {
    async fn call(&self, system: &str, transcript: &str) -> Result<String, String>;
}

fn estimate_turns_tokens(turns: &[ConversationTurn]) -> u64 {
    turns.iter().map(|t| estimate_tokens(&t.content)).sum()
}

fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn synthetic(role: TurnRole, content: String) -> ConversationTurn {
    ConversationTurn {
        session_id: String::new(),
        role,
        content,
        sender: None,
        timestamp: chrono::Utc::now(),
    }
}

/// If `history.len() <= KEEP_RECENT_TURNS`, or the estimated token count is
/// under `COMPACTION_THRESHOLD * context_window`, returns `history`
/// unchanged. Otherwise summarises everything but the most recent
/// `KEEP_RECENT_TURNS` turns and prepends a two-turn synthetic preamble.
pub async fn compact(
    history: Vec<ConversationTurn>,
    llm: &dyn LlmCall,
    context_window: u64,
) -> Vec<ConversationTurn> {
    if history.len() <= KEEP_RECENT_TURNS {
        return history;
    }

    let total_tokens = estimate_turns_tokens(&history);
    if (total_tokens as f64) <= COMPACTION_THRESHOLD * (context_window as f64) {
        return history;
    }

    let split_at = history.len() - KEEP_RECENT_TURNS;
    let (older, recent) = history.split_at(split_at);
    let older_count = older.len();
    let transcript = render_transcript(older);

    match llm.call(SUMMARY_INSTRUCTION, &transcript).await {
        Ok(summary) if !summary.trim().is_empty() => {
            let mut out = Vec::with_capacity(recent.len() + 2);
            out.push(synthetic(
                TurnRole::User,
                format!("[Conversation summary of {older_count} earlier messages]\n\n{summary}"),
            ));
            out.push(synthetic(
                TurnRole::Assistant,
                "I understand the context from our earlier conversation.".to_string(),
            ));
            out.extend(recent.iter().cloned());
            out
        }
        Ok(_) => {
            warn!("compaction summariser returned empty text, falling back to recent turns only");
            recent.to_vec()
        }
        Err(e) => {
            warn!(error = %e, "compaction summariser call failed, falling back to recent turns only");
            recent.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmCall for FixedLlm {
        async fn call(&self, _system: &str, _transcript: &str) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmCall for FailingLlm {
        async fn call(&self, _system: &str, _transcript: &str) -> Result<String, String> {
            Err("upstream down".to_string())
        }
    }

    fn turn(content: &str) -> ConversationTurn {
        synthetic(TurnRole::User, content.to_string())
    }

    #[tokio::test]
    async fn short_history_is_unchanged() {
        let history: Vec<_> = (0..3).map(|i| turn(&format!("turn {i}"))).collect();
        let out = compact(history.clone(), &FixedLlm("summary"), 200_000).await;
        assert_eq!(out.len(), history.len());
    }

    #[tokio::test]
    async fn below_threshold_is_unchanged() {
        let history: Vec<_> = (0..10).map(|i| turn(&format!("t{i}"))).collect();
        let out = compact(history.clone(), &FixedLlm("summary"), 200_000_000).await;
        assert_eq!(out.len(), history.len());
    }

    #[tokio::test]
    async fn over_threshold_summarises_older_turns() {
        let history: Vec<_> = (0..20).map(|i| turn(&format!("{i} {}", "x".repeat(1000)))).collect();
        let out = compact(history.clone(), &FixedLlm("the summary text"), 1000).await;
        assert!(out.len() >= KEEP_RECENT_TURNS + 2);
        assert!(out[0].content.contains("Conversation summary of 14 earlier messages"));
    }

    #[tokio::test]
    async fn failed_summariser_falls_back_to_recent_only() {
        let history: Vec<_> = (0..20).map(|i| turn(&format!("{} {}", i, "x".repeat(1000)))).collect();
        let out = compact(history.clone(), &FailingLlm, 1000).await;
        assert_eq!(out.len(), KEEP_RECENT_TURNS);
    }
}
