//! Routes one already-schema-validated IPC request to its handler. Mirrors
//! the gateway's flat `match method` dispatcher, generalised from a
//! synchronous WS router to an async one since most actions here touch
//! disk, SQLite, or the network.

use ax_core::audit::{AuditEvent, AuditResult};
use ax_scheduler::types::Schedule;
use serde_json::{json, Value};

use crate::app::IpcServices;
use crate::context::RequestContext;
use crate::{identity, proposal, registry, skill, web, workspace};

fn ok(data: Value) -> Value {
    json!({ "ok": true, "data": data })
}

fn err(message: impl Into<String>) -> Value {
    json!({ "ok": false, "error": message.into() })
}

fn str_field<'a>(payload: &'a Value, name: &str) -> &'a str {
    payload.get(name).and_then(Value::as_str).unwrap_or_default()
}

pub async fn route(action: &str, payload: &Value, ctx: &RequestContext, app: &IpcServices) -> Value {
    let result = match action {
        "llm_call" => handle_llm_call(payload, app).await,
        "memory_write" => handle_memory_write(payload, app),
        "memory_query" => handle_memory_query(payload, app),
        "memory_read" => handle_memory_read(payload, app),
        "memory_delete" => handle_memory_delete(payload, app),
        "memory_list" => handle_memory_list(payload, app),
        "web_fetch" => handle_web_fetch(payload, ctx, app).await,
        "web_search" => Ok(ok(json!({ "results": [] }))),
        "audit_query" => handle_audit_query(payload, ctx, app),
        "skill_list" => handle_skill_list(ctx),
        "skill_read" => handle_skill_read(payload, ctx),
        "skill_propose" => handle_skill_propose(payload, ctx),
        "identity_write" => handle_identity_write(payload, ctx, app, false),
        "identity_propose" => handle_identity_write(payload, ctx, app, true),
        "user_write" => handle_user_write(payload, ctx),
        "proposal_list" => handle_proposal_list(ctx),
        "proposal_review" => handle_proposal_review(payload, ctx, app),
        "workspace_write" => handle_workspace_write(payload, ctx, app),
        "workspace_read" => handle_workspace_read(payload, ctx),
        "workspace_list" => handle_workspace_list(payload, ctx),
        "scheduler_add_cron" => handle_scheduler_add_cron(payload, app),
        "scheduler_run_at" => handle_scheduler_run_at(payload, app),
        "scheduler_remove_cron" => handle_scheduler_remove_cron(payload, app),
        "scheduler_list_jobs" => handle_scheduler_list_jobs(app),
        "agent_registry_list" => handle_registry_list(ctx),
        "agent_registry_get" => handle_registry_get(payload, ctx),
        other => Err(format!("unimplemented action: {other}")),
    };

    result.unwrap_or_else(err)
}

async fn handle_llm_call(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let _ = app.creds.ensure_oauth_token_fresh().await;
    let mut body = payload.clone();
    if let Value::Object(ref mut map) = body {
        map.remove("action");
        map.entry("model").or_insert_with(|| json!("claude-sonnet-4-6"));
        map.entry("max_tokens").or_insert_with(|| json!(4096));
    }
    crate::llm::call(&app.upstream_base_url, &app.auth, body)
        .await
        .map(ok)
        .map_err(|e| e.to_string())
}

fn handle_memory_write(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let (scope, key, value) = (str_field(payload, "scope"), str_field(payload, "key"), str_field(payload, "value"));
    app.memory.write(scope, key, value).map_err(|e| e.to_string())?;
    Ok(ok(json!({})))
}

fn handle_memory_query(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let scope = str_field(payload, "scope");
    let query = payload.get("query").and_then(Value::as_str);
    let entries = app.memory.query(scope, query).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "entries": entries })))
}

fn handle_memory_read(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let (scope, key) = (str_field(payload, "scope"), str_field(payload, "key"));
    let entry = app.memory.read(scope, key).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "entry": entry })))
}

fn handle_memory_delete(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let (scope, key) = (str_field(payload, "scope"), str_field(payload, "key"));
    app.memory.delete(scope, key).map_err(|e| e.to_string())?;
    Ok(ok(json!({})))
}

fn handle_memory_list(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let scope = str_field(payload, "scope");
    let entries = app.memory.list(scope).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "entries": entries })))
}

async fn handle_web_fetch(payload: &Value, ctx: &RequestContext, app: &IpcServices) -> Result<Value, String> {
    let url = str_field(payload, "url");
    match web::fetch(url).await {
        Ok((status, body)) => {
            app.audit.record(AuditEvent::new("web_fetch", &ctx.session_id, json!({ "url": url }), AuditResult::Success));
            Ok(ok(json!({ "status": status, "body": body, "trust": "external" })))
        }
        Err(e) => {
            app.audit.record(AuditEvent::new("web_fetch", &ctx.session_id, json!({ "url": url, "error": e.to_string() }), AuditResult::Blocked));
            Err(e.to_string())
        }
    }
}

fn handle_audit_query(payload: &Value, ctx: &RequestContext, app: &IpcServices) -> Result<Value, String> {
    let session_id = payload.get("sessionId").and_then(Value::as_str).or(Some(ctx.session_id.as_str()));
    let limit = payload.get("limit").and_then(Value::as_u64).unwrap_or(100);
    let events = app.audit_query.query(session_id, limit);
    Ok(ok(json!({ "events": events })))
}

fn handle_skill_list(ctx: &RequestContext) -> Result<Value, String> {
    let names = skill::list(&ctx.skills_dir()).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "skills": names })))
}

fn handle_skill_read(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let name = str_field(payload, "name");
    let content = skill::read(&ctx.skills_dir(), name).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "content": content })))
}

fn handle_skill_propose(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let (name, content) = (str_field(payload, "name"), str_field(payload, "content"));
    let reason = payload.get("reason").and_then(Value::as_str).map(String::from);
    let created_by = ctx.user_id.as_deref().unwrap_or("agent");
    let p = proposal::Proposal::new("skill_propose", name, content, reason, "agent_initiated", None, created_by);
    proposal::save(&ctx.proposals_dir(), &p).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "proposalId": p.id })))
}

fn handle_identity_write(payload: &Value, ctx: &RequestContext, app: &IpcServices, force_queue: bool) -> Result<Value, String> {
    let raw_file = str_field(payload, "file");
    let file = ax_schema::normalize_identity_file(raw_file);
    identity::validate_file(&file)?;
    let content = str_field(payload, "content");
    let origin = payload.get("origin").and_then(Value::as_str).map(ax_schema::normalize_origin).unwrap_or("user_request");
    let reason = payload.get("reason").and_then(Value::as_str).map(String::from);

    let verdict = ax_scanner::scan_input(content);
    if verdict.level == ax_scanner::VerdictLevel::Block {
        let reason = verdict.reason.unwrap_or_else(|| "blocked by input scanner".to_string());
        app.audit.record(AuditEvent::new(
            "identity_write",
            &ctx.session_id,
            json!({ "file": file, "origin": origin, "reason": reason }),
            AuditResult::Blocked,
        ));
        return Err(format!("Request blocked: {reason}"));
    }

    let check = app.taint.check_action(&ctx.session_id, "identity_write", ctx.profile);
    let decision = identity::decide(ctx.profile, check.taint_ratio, force_queue);

    let audit_decision = match decision {
        identity::IdentityDecision::AutoApply => "auto_apply",
        identity::IdentityDecision::Queue => "queue",
    };
    app.audit.record(AuditEvent::new(
        "identity_write",
        &ctx.session_id,
        json!({ "file": file, "reason": reason, "origin": origin, "decision": audit_decision }),
        AuditResult::Success,
    ));

    match decision {
        identity::IdentityDecision::AutoApply => {
            identity::apply_file(&ctx.agent_dir(), &file, content).map_err(|e| e.to_string())?;
            Ok(ok(json!({ "applied": true })))
        }
        identity::IdentityDecision::Queue => {
            let created_by = ctx.user_id.as_deref().unwrap_or("agent");
            let p = proposal::Proposal::new("identity_write", &file, content, reason, origin, Some(check.taint_ratio), created_by);
            proposal::save(&ctx.proposals_dir(), &p).map_err(|e| e.to_string())?;
            Ok(ok(json!({ "applied": false, "proposalId": p.id })))
        }
    }
}

fn handle_user_write(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let (user_id, content) = (str_field(payload, "userId"), str_field(payload, "content"));
    let dir = ctx.agent_dir().join("users").join(user_id);
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    std::fs::write(dir.join("USER.md"), content).map_err(|e| e.to_string())?;
    Ok(ok(json!({})))
}

fn handle_proposal_list(ctx: &RequestContext) -> Result<Value, String> {
    let proposals = proposal::list(&ctx.proposals_dir()).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "proposals": proposals })))
}

fn handle_proposal_review(payload: &Value, ctx: &RequestContext, app: &IpcServices) -> Result<Value, String> {
    let id = str_field(payload, "proposalId");
    let decision = str_field(payload, "decision");
    let status = if decision == "approved" { proposal::ProposalStatus::Approved } else { proposal::ProposalStatus::Rejected };

    let Some(updated) = proposal::set_status(&ctx.proposals_dir(), id, status.clone()).map_err(|e| e.to_string())? else {
        return Err(format!("no such proposal: {id}"));
    };

    if status == proposal::ProposalStatus::Approved {
        match updated.kind.as_str() {
            "identity_write" => {
                identity::validate_file(&updated.target)?;
                identity::apply_file(&ctx.agent_dir(), &updated.target, &updated.content).map_err(|e| e.to_string())?
            }
            "skill_propose" => {
                std::fs::create_dir_all(ctx.skills_dir()).map_err(|e| e.to_string())?;
                std::fs::write(ctx.skills_dir().join(format!("{}.md", updated.target)), &updated.content).map_err(|e| e.to_string())?;
            }
            _ => {}
        }
    }

    app.audit.record(AuditEvent::new(
        "proposal_review",
        &ctx.session_id,
        json!({ "proposalId": id, "decision": decision }),
        AuditResult::Success,
    ));

    Ok(ok(json!({ "proposal": updated })))
}

fn handle_workspace_write(payload: &Value, ctx: &RequestContext, app: &IpcServices) -> Result<Value, String> {
    let tier = str_field(payload, "tier");
    let path = str_field(payload, "path");
    let content = str_field(payload, "content");

    let verdict = ax_scanner::scan_input(content);
    if verdict.level == ax_scanner::VerdictLevel::Block {
        let reason = verdict.reason.unwrap_or_else(|| "blocked by input scanner".to_string());
        app.audit.record(AuditEvent::new(
            "workspace_write",
            &ctx.session_id,
            json!({ "tier": tier, "path": path, "reason": reason }),
            AuditResult::Blocked,
        ));
        return Err(format!("Request blocked: {reason}"));
    }

    workspace::write(&ctx.workspace_dir(tier), path, content).map_err(|e| e.to_string())?;
    Ok(ok(json!({})))
}

fn handle_workspace_read(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let tier = str_field(payload, "tier");
    let path = str_field(payload, "path");
    let content = workspace::read(&ctx.workspace_dir(tier), path).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "content": content })))
}

fn handle_workspace_list(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let tier = str_field(payload, "tier");
    let path = payload.get("path").and_then(Value::as_str);
    let entries = workspace::list(&ctx.workspace_dir(tier), path).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "entries": entries })))
}

fn handle_scheduler_add_cron(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let name = str_field(payload, "name");
    let expression = str_field(payload, "expression").to_string();
    let action = payload.get("action").cloned().unwrap_or(json!({})).to_string();
    let run_once = payload.get("runOnce").and_then(Value::as_bool).unwrap_or(false);
    let job = app.scheduler.add_job(name, Schedule::Cron { expression }, &action, run_once).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "job": job })))
}

fn handle_scheduler_run_at(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let name = str_field(payload, "name");
    let fire_at = str_field(payload, "fireAt");
    let at = chrono::DateTime::parse_from_rfc3339(fire_at)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| format!("invalid fireAt: {e}"))?;
    let action = payload.get("action").cloned().unwrap_or(json!({})).to_string();
    let job = app.scheduler.add_job(name, Schedule::Once { at }, &action, true).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "job": job })))
}

fn handle_scheduler_remove_cron(payload: &Value, app: &IpcServices) -> Result<Value, String> {
    let id = str_field(payload, "id");
    app.scheduler.remove_job(id).map_err(|e| e.to_string())?;
    Ok(ok(json!({})))
}

fn handle_scheduler_list_jobs(app: &IpcServices) -> Result<Value, String> {
    let jobs = app.scheduler.list_jobs().map_err(|e| e.to_string())?;
    Ok(ok(json!({ "jobs": jobs })))
}

fn handle_registry_list(ctx: &RequestContext) -> Result<Value, String> {
    let agents = registry::list(&ctx.registry_path()).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "agents": agents })))
}

fn handle_registry_get(payload: &Value, ctx: &RequestContext) -> Result<Value, String> {
    let id = str_field(payload, "id");
    let agent = registry::get(&ctx.registry_path(), id).map_err(|e| e.to_string())?;
    Ok(ok(json!({ "agent": agent })))
}
