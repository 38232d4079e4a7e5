//! §4.8 identity-change decision tree: given the caller's profile and the
//! taint ratio of the current session, decide whether an `identity_write`
//! (or `identity_propose`) request applies immediately or only queues a
//! proposal for human review.
//!
//! - `paranoid`  — always queue, never auto-apply, regardless of origin.
//! - `balanced`  — auto-apply iff the session's taint ratio is at or below
//!   the profile's sensitive-action threshold; otherwise queue.
//! - `yolo`      — always auto-apply.
//!
//! `identity_propose` always queues regardless of profile — it's the
//! explicit "ask a human" action, as opposed to `identity_write`'s
//! conditional auto-apply.

use ax_core::types::Profile;

/// §4.8's closed set of identity files. Schema validation only types `file`
/// as a string (no `..` check), so this is the actual traversal guard
/// between a write request and `apply_file`'s `agent_dir.join(file)`.
pub const ALLOWED_FILES: &[&str] = &["SOUL.md", "IDENTITY.md", "USER.md"];

/// Rejects anything outside `ALLOWED_FILES`, after normalisation has already
/// mapped known aliases to their canonical name.
pub fn validate_file(file: &str) -> Result<(), String> {
    if ALLOWED_FILES.contains(&file) {
        Ok(())
    } else {
        Err(format!("identity file not allowed: {file}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityDecision {
    AutoApply,
    Queue,
}

pub fn decide(profile: Profile, taint_ratio: f64, force_queue: bool) -> IdentityDecision {
    if force_queue {
        return IdentityDecision::Queue;
    }
    match profile {
        Profile::Paranoid => IdentityDecision::Queue,
        Profile::Yolo => IdentityDecision::AutoApply,
        Profile::Balanced => {
            if taint_ratio <= profile.sensitive_threshold() {
                IdentityDecision::AutoApply
            } else {
                IdentityDecision::Queue
            }
        }
    }
}

/// Applying SOUL.md supersedes any pending bootstrap — the agent has
/// graduated from its first-boot identity draft.
pub fn apply_file(agent_dir: &std::path::Path, file: &str, content: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(agent_dir)?;
    std::fs::write(agent_dir.join(file), content)?;
    if file == "SOUL.md" {
        let bootstrap = agent_dir.join("BOOTSTRAP.md");
        if bootstrap.exists() {
            std::fs::remove_file(bootstrap)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paranoid_always_queues() {
        assert_eq!(decide(Profile::Paranoid, 0.0, false), IdentityDecision::Queue);
        assert_eq!(decide(Profile::Paranoid, 0.9, false), IdentityDecision::Queue);
    }

    #[test]
    fn yolo_always_auto_applies() {
        assert_eq!(decide(Profile::Yolo, 0.99, false), IdentityDecision::AutoApply);
    }

    #[test]
    fn balanced_gates_on_taint_ratio() {
        assert_eq!(decide(Profile::Balanced, 0.1, false), IdentityDecision::AutoApply);
        assert_eq!(decide(Profile::Balanced, 0.9, false), IdentityDecision::Queue);
    }

    #[test]
    fn force_queue_overrides_everything() {
        assert_eq!(decide(Profile::Yolo, 0.0, true), IdentityDecision::Queue);
    }

    #[test]
    fn validate_file_accepts_allowed_names() {
        assert!(validate_file("SOUL.md").is_ok());
        assert!(validate_file("IDENTITY.md").is_ok());
        assert!(validate_file("USER.md").is_ok());
    }

    #[test]
    fn validate_file_rejects_traversal_and_unknown_names() {
        assert!(validate_file("../../../etc/cron.d/x").is_err());
        assert!(validate_file("notes.md").is_err());
        assert!(validate_file("").is_err());
    }

    #[test]
    fn applying_soul_deletes_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("BOOTSTRAP.md"), "draft").unwrap();
        apply_file(dir.path(), "SOUL.md", "final soul").unwrap();
        assert!(!dir.path().join("BOOTSTRAP.md").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("SOUL.md")).unwrap(), "final soul");
    }
}
