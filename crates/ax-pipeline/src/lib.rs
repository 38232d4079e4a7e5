//! C13 — the completion pipeline. Wires C8 (router), C5 (queue), C6/C7
//! (store), C10 (sandbox), C11 (proxy), C14 (credentials), and C4 (taint)
//! into the single request path spec.md §4.13 describes step by step.

pub mod diagnose;
pub mod drain;
pub mod error;
pub mod history;
pub mod llm_compactor;
pub mod memory;
pub mod pipeline;
pub mod stdin_payload;
pub mod workspace;

pub use drain::{drain_and_wait, DrainedOutput};
pub use error::{PipelineError, Result};
pub use history::{build_history, turns_to_history_entries, HistorySource};
pub use llm_compactor::HostLlmCaller;
pub use memory::MemoryProvider;
pub use pipeline::{
    CompletionOutcome, CompletionPipeline, CompletionRequest, InboundSource, PipelineConfig, SessionKind,
};
pub use stdin_payload::{AgentStdinPayload, HistoryEntry};
pub use workspace::{gc_stale_workspaces, refresh_skills, ScratchGuard, WorkspaceGuard, STALE_WORKSPACE_AFTER};
