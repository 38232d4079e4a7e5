//! History assembly for one completion, per spec.md §4.13 steps 5-6:
//! persistent sessions read from the conversation store up to `max_turns`;
//! thread sessions prepend up to `thread_context_turns` from the parent
//! channel session, deduping the seam where the parent's last turn and the
//! thread's first turn are the same message; ephemeral sessions use
//! whatever prior turns the caller already had in hand. Compaction runs
//! afterwards if the assembled history is still too large.

use ax_core::types::{SessionAddress, TurnRole};
use ax_store::{compact, ConversationStore, ConversationTurn, LlmCall};

use crate::stdin_payload::HistoryEntry;

/// Where a completion's prior turns come from.
pub enum HistorySource<'a> {
    /// Persistent session: load from the conversation store.
    Persistent {
        store: &'a ConversationStore,
        address: &'a SessionAddress,
        max_turns: u64,
        thread_context_turns: u64,
    },
    /// Ephemeral session: the caller already has the turns (e.g. supplied by
    /// an upstream-compatible chat request's `messages[]`).
    Ephemeral { turns: Vec<ConversationTurn> },
}

/// Loads and, if oversized, compacts the history for one completion.
pub async fn build_history(
    source: HistorySource<'_>,
    llm: &dyn LlmCall,
    context_window: u64,
) -> crate::error::Result<Vec<ConversationTurn>> {
    let turns = match source {
        HistorySource::Persistent {
            store,
            address,
            max_turns,
            thread_context_turns,
        } => load_persistent(store, address, max_turns, thread_context_turns)?,
        HistorySource::Ephemeral { turns } => turns,
    };

    let compacted = compact::compact(turns, llm, context_window).await;
    Ok(compacted)
}

fn load_persistent(
    store: &ConversationStore,
    address: &SessionAddress,
    max_turns: u64,
    thread_context_turns: u64,
) -> crate::error::Result<Vec<ConversationTurn>> {
    let session_id = address.canonical();
    let mut turns = store.load(&session_id, max_turns)?;

    if let Some(parent) = &address.parent {
        let parent_id = parent.canonical();
        let mut parent_turns = store.load(&parent_id, thread_context_turns)?;

        // Dedup the seam: if the parent channel's last turn is the same
        // message as this thread's first turn (same role + content), drop
        // the duplicate from the prepended parent slice.
        if let (Some(last_parent), Some(first_thread)) = (parent_turns.last(), turns.first()) {
            if last_parent.role == first_thread.role && last_parent.content == first_thread.content
            {
                parent_turns.pop();
            }
        }

        parent_turns.extend(turns);
        turns = parent_turns;
    }

    Ok(turns)
}

/// Converts assembled turns into the wire shape written to the agent's
/// stdin payload.
pub fn turns_to_history_entries(turns: &[ConversationTurn]) -> Vec<HistoryEntry> {
    turns
        .iter()
        .map(|t| HistoryEntry {
            role: match t.role {
                TurnRole::User => "user".to_string(),
                TurnRole::Assistant => "assistant".to_string(),
            },
            content: t.content.clone(),
            sender: t.sender.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::types::AddressScope;
    use chrono::Utc;

    struct NoopLlm;

    #[async_trait::async_trait]
    impl LlmCall for NoopLlm {
        async fn call(&self, _system: &str, _transcript: &str) -> Result<String, String> {
            Ok(String::new())
        }
    }

    fn turn(session: &str, role: TurnRole, content: &str) -> ConversationTurn {
        ConversationTurn {
            session_id: session.to_string(),
            role,
            content: content.to_string(),
            sender: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persistent_session_prepends_parent_turns_with_seam_dedup() {
        let store = ConversationStore::in_memory().unwrap();
        let parent = SessionAddress::new("test", AddressScope::Channel);
        let thread = SessionAddress::new("test", AddressScope::Thread).with_parent(parent.clone());

        store
            .append(&parent.canonical(), TurnRole::User, "parent msg 1", None)
            .unwrap();
        store
            .append(&parent.canonical(), TurnRole::Assistant, "shared seam", None)
            .unwrap();
        store
            .append(&thread.canonical(), TurnRole::Assistant, "shared seam", None)
            .unwrap();
        store
            .append(&thread.canonical(), TurnRole::User, "thread msg", None)
            .unwrap();

        let result = build_history(
            HistorySource::Persistent {
                store: &store,
                address: &thread,
                max_turns: 100,
                thread_context_turns: 100,
            },
            &NoopLlm,
            200_000,
        )
        .await
        .unwrap();

        let contents: Vec<&str> = result.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["parent msg 1", "shared seam", "thread msg"]);
    }

    #[tokio::test]
    async fn ephemeral_session_uses_supplied_turns_verbatim() {
        let turns = vec![turn("ephemeral", TurnRole::User, "hi")];
        let result = build_history(HistorySource::Ephemeral { turns: turns.clone() }, &NoopLlm, 200_000)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "hi");
    }
}
