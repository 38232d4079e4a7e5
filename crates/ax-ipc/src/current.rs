//! Binds the next accepted IPC connection to the completion that caused it.
//!
//! One sandboxed agent process connects to the shared `ax.sock` path for
//! the lifetime of exactly one completion (spec.md §5's resource model runs
//! at most one sandbox per session concurrently), so the pipeline sets this
//! slot immediately before spawning the sandbox and clears it right after
//! the drain finishes. `server::serve`'s `ctx_factory` reads it at accept
//! time. A peer-credential-keyed registry would be more robust under
//! multiple concurrent sandboxes; this slot is the simpler design this
//! host's single-completion-at-a-time model allows.

use std::sync::{Mutex, OnceLock};

use crate::context::RequestContext;

static CURRENT: OnceLock<Mutex<Option<RequestContext>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<RequestContext>> {
    CURRENT.get_or_init(|| Mutex::new(None))
}

pub fn set_current(ctx: RequestContext) {
    *slot().lock().unwrap() = Some(ctx);
}

pub fn clear_current() {
    *slot().lock().unwrap() = None;
}

pub fn current() -> Option<RequestContext> {
    slot().lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::types::Profile;
    use std::path::PathBuf;

    fn ctx(session_id: &str) -> RequestContext {
        RequestContext {
            session_id: session_id.to_string(),
            agent_id: "default".to_string(),
            user_id: None,
            profile: Profile::Balanced,
            data_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn set_then_current_round_trips_and_clear_empties_it() {
        set_current(ctx("s1"));
        assert_eq!(current().unwrap().session_id, "s1");
        clear_current();
        assert!(current().is_none());
    }
}
