//! The optional memorisation hook a completion feeds its turns to on
//! success (spec.md §4.13 step 13). No concrete provider ships here — only
//! the trait every implementation plugs into, per the non-goal that keeps
//! concrete memory providers out of this host.

use async_trait::async_trait;
use ax_store::ConversationTurn;

#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Feed the just-completed exchange to whatever memorisation a
    /// provider implements. Failure is logged by the caller and never
    /// propagated — memorisation is best-effort.
    async fn memorize(&self, turns: &[ConversationTurn]) -> Result<(), String>;
}
