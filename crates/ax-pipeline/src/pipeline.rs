//! C13 — the completion pipeline. One request path, reproduced
//! step-for-step from spec.md §4.13: dequeue-by-id, materialise a
//! workspace, refresh skills, build (and maybe compact) history, pre-flight
//! credentials, optionally start a proxy, spawn the sandbox, write the
//! stdin payload, drain concurrently, scan the reply, persist, and always
//! clean up in a `finally`-equivalent.
//!
//! Grounded on `process_message_non_streaming`'s overall shape (load
//! history → build request → run turn → persist → fire-and-forget
//! follow-up) but re-targeted at the fifteen numbered steps below.

use std::path::PathBuf;
use std::sync::Arc;

use ax_core::audit::{AuditEvent, AuditResult, AuditSink};
use ax_core::types::{estimate_tokens, InboundMessage, Profile, SessionAddress, TurnRole};
use ax_creds::CredsRefresher;
use ax_proxy::{AuthMode, ProxyState};
use ax_queue::QueueManager;
use ax_router::Router;
use ax_sandbox::{SandboxBackend, SandboxConfig as BackendSandboxConfig};
use ax_store::{ConversationStore, ConversationTurn};
use ax_taint::TaintBudget;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use ax_taint::ActionCheck;

use crate::diagnose::diagnose;
use crate::drain::{drain_and_wait, DrainedOutput};
use crate::error::{PipelineError, Result};
use crate::history::{build_history, turns_to_history_entries, HistorySource};
use crate::llm_compactor::HostLlmCaller;
use crate::memory::MemoryProvider;
use crate::stdin_payload::AgentStdinPayload;
use crate::workspace::{refresh_skills, ScratchGuard, WorkspaceGuard};

/// Static, per-host configuration the pipeline needs for every completion.
/// Built once from `AxConfig` by `ax-host` and shared across requests.
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub host_skills_dir: PathBuf,
    pub proxy_socket_dir: PathBuf,
    pub sandbox_command: Vec<String>,
    pub sandbox_timeout_sec: u64,
    pub sandbox_memory_mb: u64,
    pub context_window: u64,
    pub max_turns: u64,
    pub thread_context_turns: u64,
    pub model: String,
    pub upstream_base_url: String,
}

/// Where a completion's session lives: persistent sessions address a
/// durable conversation; ephemeral ones (e.g. a one-shot HTTP call with no
/// `session_id`) carry their own prior turns and are discarded afterwards.
pub enum SessionKind {
    Persistent(SessionAddress),
    Ephemeral { prior_turns: Vec<ConversationTurn> },
}

/// How this completion's inbound content reached the pipeline.
pub enum InboundSource {
    /// Already scanned and queued upstream (a channel adapter or the
    /// scheduler pre-processes through C8 itself).
    PreProcessed { session_id: String, message_id: String, canary_token: String },
    /// Build a synthetic inbound and run it through C8 here.
    Raw(InboundMessage),
}

pub struct CompletionRequest {
    pub inbound: InboundSource,
    pub session: SessionKind,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    /// Whether this agent type expects the caller to tolerate "no reply" —
    /// fire-and-forget channels set this true.
    pub reply_optional: bool,
    /// Whether this agent type talks to the upstream model directly (needs
    /// a proxy + credential pre-flight) rather than over IPC's `llm_call`.
    pub needs_direct_upstream: bool,
    pub profile: Profile,
}

/// Outcome of one completion. `blocked` distinguishes a content-filtered
/// refusal (still a 200 to the caller) from a genuine failure.
pub struct CompletionOutcome {
    pub reply: String,
    pub blocked: bool,
}

pub struct CompletionPipeline {
    config: PipelineConfig,
    router: Arc<Router>,
    queue: Arc<QueueManager>,
    store: Arc<ConversationStore>,
    taint: Arc<TaintBudget>,
    sandbox: Arc<dyn SandboxBackend>,
    creds: Arc<CredsRefresher>,
    auth: AuthMode,
    audit: Arc<dyn AuditSink>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

impl CompletionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        router: Arc<Router>,
        queue: Arc<QueueManager>,
        store: Arc<ConversationStore>,
        taint: Arc<TaintBudget>,
        sandbox: Arc<dyn SandboxBackend>,
        creds: Arc<CredsRefresher>,
        auth: AuthMode,
        audit: Arc<dyn AuditSink>,
        memory: Option<Arc<dyn MemoryProvider>>,
    ) -> Self {
        Self {
            config,
            router,
            queue,
            store,
            taint,
            sandbox,
            creds,
            auth,
            audit,
            memory,
        }
    }

    pub async fn run(&self, request: CompletionRequest) -> Result<CompletionOutcome> {
        // Step 1: pre-processed vs raw inbound.
        let (session_id, message_id, canary_token) = match request.inbound {
            InboundSource::PreProcessed { session_id, message_id, canary_token } => {
                (session_id, message_id, canary_token)
            }
            InboundSource::Raw(msg) => {
                let result = self.router.process_inbound(&msg);
                if !result.queued {
                    let reason = result.scan_result.reason.unwrap_or_else(|| "blocked".to_string());
                    return Ok(CompletionOutcome {
                        reply: format!("Request blocked: {reason}"),
                        blocked: true,
                    });
                }
                (result.session_id, result.message_id.expect("queued implies an id"), result.canary_token)
            }
        };

        // Step 2: dequeue the exact message by id.
        let queued = self
            .queue
            .dequeue_by_id(&message_id)?
            .ok_or_else(|| PipelineError::MessageNotPending(message_id.clone()))?;

        let outcome = self.run_completion(&session_id, &queued.content, &canary_token, &request, &message_id).await;

        match &outcome {
            Ok(_) => {
                let _ = self.queue.complete(&message_id);
            }
            Err(_) => {
                let _ = self.queue.fail(&message_id);
            }
        }

        outcome
    }

    async fn run_completion(
        &self,
        session_id: &str,
        inbound_content: &str,
        canary_token: &str,
        request: &CompletionRequest,
        message_id: &str,
    ) -> Result<CompletionOutcome> {
        // Step 3: workspace materialisation.
        let workspace = match &request.session {
            SessionKind::Persistent(_) => WorkspaceGuard::persistent(&self.config.data_dir, session_id)?,
            SessionKind::Ephemeral { .. } => WorkspaceGuard::ephemeral()?,
        };
        let scratch = ScratchGuard::create(&self.config.data_dir, session_id)?;

        let result = self
            .run_in_workspace(session_id, inbound_content, canary_token, request, message_id, &workspace, &scratch)
            .await;

        // Step 15: finally clause — `workspace`'s own `Drop` removes an
        // ephemeral directory here (a persistent one is left in place);
        // the scratch dir is always removed explicitly.
        drop(workspace);
        scratch.remove();

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_in_workspace(
        &self,
        session_id: &str,
        inbound_content: &str,
        canary_token: &str,
        request: &CompletionRequest,
        message_id: &str,
        workspace: &WorkspaceGuard,
        scratch: &ScratchGuard,
    ) -> Result<CompletionOutcome> {
        // Step 4: refresh skills into <workspace>/skills.
        refresh_skills(&self.config.host_skills_dir, workspace.path())?;

        // Step 5 + 6: build history, compacting if oversized.
        let llm_caller = HostLlmCaller::new(&self.config.upstream_base_url, self.auth.clone(), &self.config.model);
        let history_source = match &request.session {
            SessionKind::Persistent(address) => HistorySource::Persistent {
                store: &self.store,
                address,
                max_turns: self.config.max_turns,
                thread_context_turns: self.config.thread_context_turns,
            },
            SessionKind::Ephemeral { prior_turns } => HistorySource::Ephemeral { turns: prior_turns.clone() },
        };
        let history = build_history(history_source, &llm_caller, self.config.context_window).await?;

        // Step 7: pre-flight credential refresh, fail fast with no spawn.
        if request.needs_direct_upstream {
            if let Err(e) = self.creds.ensure_oauth_token_fresh().await {
                warn!(error = %e, "oauth pre-flight refresh failed");
            }
            if ax_proxy::auth::auth_headers(&self.auth).is_none() {
                return Err(PipelineError::Credential(
                    "no upstream credentials configured".to_string(),
                ));
            }
        }

        // Step 8: start the proxy on a fresh UDS path if this agent type needs it.
        let mut proxy_shutdown: Option<watch::Sender<bool>> = None;
        let mut proxy_join: Option<tokio::task::JoinHandle<()>> = None;
        let proxy_socket_path = if request.needs_direct_upstream {
            let path = self.config.proxy_socket_dir.join(format!("{}.sock", Uuid::new_v4()));
            let (tx, rx) = watch::channel(false);
            let refresh_callback: Arc<dyn ax_proxy::RefreshCallback> = Arc::clone(&self.creds) as Arc<dyn ax_proxy::RefreshCallback>;
            let state = Arc::new(ProxyState::new(
                self.config.upstream_base_url.clone(),
                self.auth.clone(),
                Some(refresh_callback),
            ));
            let serve_path = path.clone();
            let join = tokio::spawn(async move {
                if let Err(e) = ax_proxy::server::serve(&serve_path, state, rx).await {
                    warn!(error = %e, "proxy server exited with error");
                }
            });
            proxy_shutdown = Some(tx);
            proxy_join = Some(join);
            Some(path)
        } else {
            None
        };

        let result = self
            .spawn_and_run(
                session_id,
                inbound_content,
                canary_token,
                request,
                message_id,
                workspace,
                scratch,
                proxy_socket_path.as_deref(),
                history,
            )
            .await;

        // Step 15 (partial): stop the proxy regardless of outcome.
        if let Some(tx) = proxy_shutdown {
            let _ = tx.send(true);
        }
        if let Some(join) = proxy_join {
            let _ = join.await;
        }

        result
    }

    /// Spawns the sandbox, writes its stdin payload, and drains it — the
    /// part of step 9-11 that must run with the IPC context slot set, so
    /// `spawn_and_run` can clear the slot in every exit path including
    /// spawn/write failures.
    #[allow(clippy::too_many_arguments)]
    async fn run_sandboxed_turn(
        &self,
        sandbox_cfg: BackendSandboxConfig,
        inbound_content: &str,
        taint_check: &ActionCheck,
        request: &CompletionRequest,
        scratch: &ScratchGuard,
        history: &[ConversationTurn],
    ) -> Result<DrainedOutput> {
        let mut handle = self.sandbox.spawn(sandbox_cfg).await?;

        // Step 10: write the single stdin JSON payload, then close stdin.
        let payload = AgentStdinPayload {
            history: turns_to_history_entries(history),
            message: inbound_content.to_string(),
            taint_ratio: taint_check.taint_ratio,
            taint_threshold: taint_check.threshold,
            profile: request.profile,
            sandbox_type: "subprocess".to_string(),
            user_id: request.user_id.clone(),
            reply_optional: request.reply_optional,
            agent_id: request.agent_id.clone(),
            agent_workspace: None,
            user_workspace: None,
            scratch_dir: Some(scratch.path().to_string_lossy().to_string()),
        };
        let payload_json = serde_json::to_vec(&payload).map_err(|e| PipelineError::Internal(e.to_string()))?;
        handle.stdin.write_all(&payload_json).await?;
        handle.stdin.shutdown().await?;

        // Step 11: concurrent stdout/stderr drain.
        drain_and_wait(handle).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn_and_run(
        &self,
        session_id: &str,
        inbound_content: &str,
        canary_token: &str,
        request: &CompletionRequest,
        message_id: &str,
        workspace: &WorkspaceGuard,
        scratch: &ScratchGuard,
        proxy_socket_path: Option<&std::path::Path>,
        history: Vec<ConversationTurn>,
    ) -> Result<CompletionOutcome> {
        let taint_check = self.taint.check_action(session_id, "__pipeline_ratio_probe__", request.profile);

        // Step 9: spawn the sandbox with the uniform command vector.
        let agent_dir = request
            .agent_id
            .as_deref()
            .map(|id| self.config.data_dir.join("agents").join(id))
            .unwrap_or_else(|| self.config.data_dir.join("agents").join("default"));
        let skills_dir = workspace.path().join("skills");
        let ipc_socket = self.config.data_dir.join("ax.sock");

        let sandbox_cfg = BackendSandboxConfig {
            workspace: workspace.path().to_path_buf(),
            skills: skills_dir,
            ipc_socket,
            agent_dir,
            agent_workspace: None,
            user_workspace: None,
            scratch_dir: scratch.path().to_path_buf(),
            proxy_socket: proxy_socket_path.map(|p| p.to_path_buf()),
            timeout_sec: self.config.sandbox_timeout_sec,
            memory_mb: self.config.sandbox_memory_mb,
            command: self.config.sandbox_command.clone(),
        };

        // This completion's sandbox is the only process that will connect
        // to the shared IPC socket until it exits, so the next accepted
        // connection belongs to it — see `ax_ipc::current` for why this is
        // safe under the single-sandbox-at-a-time resource model.
        ax_ipc::set_current(ax_ipc::RequestContext {
            session_id: session_id.to_string(),
            agent_id: request.agent_id.clone().unwrap_or_else(|| "default".to_string()),
            user_id: request.user_id.clone(),
            profile: request.profile,
            data_dir: self.config.data_dir.clone(),
        });

        let run_result = self
            .run_sandboxed_turn(sandbox_cfg, inbound_content, &taint_check, request, scratch, &history)
            .await;

        ax_ipc::clear_current();

        let drained = run_result?;

        if drained.exit_code != 0 {
            // Step 12: non-zero exit — diagnose, mark failed (caller does),
            // return a structured apology, never poison the turn log.
            self.audit.record(AuditEvent::new(
                "completion",
                session_id,
                serde_json::json!({"exitCode": drained.exit_code}),
                AuditResult::Failed,
            ));
            return Err(PipelineError::AgentFailure(diagnose(&drained.stderr)));
        }

        // Step 13: run C8 outbound on the collected stdout.
        let outbound = self.router.process_outbound(&drained.stdout, session_id, canary_token);

        if let Some(memory) = &self.memory {
            let mut memorised = history.clone();
            memorised.push(ConversationTurn {
                session_id: session_id.to_string(),
                role: TurnRole::User,
                content: inbound_content.to_string(),
                sender: None,
                timestamp: chrono::Utc::now(),
            });
            memorised.push(ConversationTurn {
                session_id: session_id.to_string(),
                role: TurnRole::Assistant,
                content: outbound.content.clone(),
                sender: None,
                timestamp: chrono::Utc::now(),
            });
            let memory = Arc::clone(memory);
            tokio::spawn(async move {
                if let Err(e) = memory.memorize(&memorised).await {
                    warn!(error = %e, "memorisation failed, tolerating");
                }
            });
        }

        // Step 14: mark complete (by caller), drop canary, persist turns, prune.
        self.router.end_session(session_id);
        if let SessionKind::Persistent(_) = &request.session {
            self.store.append(session_id, TurnRole::User, inbound_content, request.user_id.as_deref())?;
            self.store.append(session_id, TurnRole::Assistant, &outbound.content, None)?;
            if self.store.count(session_id)? > self.config.max_turns {
                self.store.prune(session_id, self.config.max_turns)?;
            }
        }

        self.audit.record(AuditEvent::new(
            "completion",
            session_id,
            serde_json::json!({"messageId": message_id}),
            AuditResult::Success,
        ));

        info!(session_id, tokens = estimate_tokens(&outbound.content), "completion finished");

        Ok(CompletionOutcome {
            reply: outbound.content,
            blocked: outbound.canary_leaked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::audit::NullAuditSink;
    use ax_core::types::AddressScope;
    use ax_sandbox::SubprocessBackend;
    use ax_store::ConversationStore;

    struct Harness {
        pipeline: CompletionPipeline,
        queue: Arc<QueueManager>,
        store: Arc<ConversationStore>,
        _data_dir: tempfile::TempDir,
    }

    fn harness(sandbox_command: Vec<&str>) -> Harness {
        let data_dir = tempfile::tempdir().unwrap();
        let host_skills_dir = data_dir.path().join("host-skills");
        std::fs::create_dir_all(&host_skills_dir).unwrap();
        let proxy_socket_dir = data_dir.path().join("proxy-sockets");
        std::fs::create_dir_all(&proxy_socket_dir).unwrap();

        let queue = Arc::new(QueueManager::in_memory().unwrap());
        let store = Arc::new(ConversationStore::in_memory().unwrap());
        let taint = Arc::new(TaintBudget::new());
        let audit: Arc<dyn AuditSink> = Arc::new(NullAuditSink);
        let router = Arc::new(Router::new(Arc::clone(&taint), Arc::clone(&queue), Arc::clone(&audit)));
        let creds = Arc::new(CredsRefresher::new(
            "https://example.invalid/oauth/token",
            "test-client",
            data_dir.path().join("creds.env"),
        ));

        let config = PipelineConfig {
            data_dir: data_dir.path().to_path_buf(),
            host_skills_dir,
            proxy_socket_dir,
            sandbox_command: sandbox_command.into_iter().map(String::from).collect(),
            sandbox_timeout_sec: 5,
            sandbox_memory_mb: 64,
            context_window: 200_000,
            max_turns: 50,
            thread_context_turns: 10,
            model: "claude-test".to_string(),
            upstream_base_url: "https://example.invalid".to_string(),
        };

        let pipeline = CompletionPipeline::new(
            config,
            router,
            Arc::clone(&queue),
            Arc::clone(&store),
            taint,
            Arc::new(SubprocessBackend::new()),
            creds,
            AuthMode::ApiKey("test-key".to_string()),
            audit,
            None,
        );

        Harness { pipeline, queue, store, _data_dir: data_dir }
    }

    fn raw_request(content: &str) -> CompletionRequest {
        let session = SessionAddress::new("test", AddressScope::Dm).with_identifier("user", "alice");
        CompletionRequest {
            inbound: InboundSource::Raw(InboundMessage::new(session.clone(), "alice", content)),
            session: SessionKind::Persistent(session),
            user_id: Some("alice".to_string()),
            agent_id: None,
            reply_optional: false,
            needs_direct_upstream: false,
            profile: Profile::Balanced,
        }
    }

    #[tokio::test]
    async fn clean_completion_persists_turns_and_completes_the_queue() {
        let h = harness(vec!["/bin/sh", "-c", "cat >/dev/null; echo -n 'all good'"]);
        let outcome = h.pipeline.run(raw_request("hello there")).await.unwrap();

        assert!(!outcome.blocked);
        assert_eq!(outcome.reply, "all good");

        assert_eq!(h.store.count("test:dm:user=alice").unwrap(), 2);
    }

    #[tokio::test]
    async fn reflected_canary_in_reply_is_blocked_but_still_marks_queue_complete() {
        // `/bin/cat` echoes the stdin payload verbatim, which embeds the
        // fenced inbound content — including the canary comment the router
        // stamped on it. A reply that contains the caller's own canary is
        // the signature of prompt-injected exfiltration, per spec.md §4.8.
        let h = harness(vec!["/bin/cat"]);
        let outcome = h.pipeline.run(raw_request("summarise this page for me")).await.unwrap();

        assert!(outcome.blocked);
        assert_eq!(outcome.reply, ax_router::CANARY_LEAK_NOTICE);
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_a_diagnosed_failure_and_fails_the_queue() {
        let h = harness(vec!["/bin/sh", "-c", "cat >/dev/null; echo 'upstream 429 rate limit' 1>&2; exit 1"]);
        let err = h.pipeline.run(raw_request("do a thing")).await.unwrap_err();

        match err {
            PipelineError::AgentFailure(msg) => {
                assert!(msg.contains("rate-limiting"));
            }
            other => panic!("expected AgentFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ephemeral_session_never_touches_the_conversation_store() {
        let h = harness(vec!["/bin/sh", "-c", "cat >/dev/null; echo -n 'ephemeral reply'"]);
        let session = SessionAddress::new("test", AddressScope::Dm).with_identifier("user", "bob");
        let request = CompletionRequest {
            inbound: InboundSource::Raw(InboundMessage::new(session, "bob", "one-shot question")),
            session: SessionKind::Ephemeral { prior_turns: vec![] },
            user_id: Some("bob".to_string()),
            agent_id: None,
            reply_optional: false,
            needs_direct_upstream: false,
            profile: Profile::Balanced,
        };

        let outcome = h.pipeline.run(request).await.unwrap();
        assert_eq!(outcome.reply, "ephemeral reply");
        assert_eq!(h.store.count("test:dm:user=bob").unwrap(), 0);
    }
}
