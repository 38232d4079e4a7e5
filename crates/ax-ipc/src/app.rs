use std::path::PathBuf;
use std::sync::Arc;

use ax_core::audit::{AuditQuery, AuditSink};
use ax_creds::CredsRefresher;
use ax_proxy::AuthMode;
use ax_scheduler::SchedulerHandle;
use ax_store::{ConversationStore, MemoryStore};
use ax_taint::TaintBudget;

/// Everything a handler needs, wired once at startup and shared behind Arcs
/// across every connection the server accepts.
pub struct IpcServices {
    pub data_dir: PathBuf,
    pub taint: Arc<TaintBudget>,
    pub memory: Arc<MemoryStore>,
    pub conversation: Arc<ConversationStore>,
    pub scheduler: Arc<SchedulerHandle>,
    pub audit: Arc<dyn AuditSink>,
    pub audit_query: Arc<dyn AuditQuery>,
    pub upstream_base_url: String,
    pub auth: AuthMode,
    pub creds: Arc<CredsRefresher>,
}
