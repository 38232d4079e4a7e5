//! Per-completion workspace materialisation. Persistent sessions get a
//! deterministic path under the data directory; ephemeral ones get a
//! `tempfile`-managed directory that is removed when the guard drops —
//! Rust's answer to the spec's "delete in the finally clause", mirrored
//! after the teacher's habit of a guard object owning its own cleanup.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Owns the lifetime of one completion's workspace directory. For a
/// persistent session the directory is left on disk when the guard drops
/// (it's the session's long-lived home); for an ephemeral one, `TempDir`'s
/// own `Drop` removes it.
pub enum WorkspaceGuard {
    Persistent(PathBuf),
    Ephemeral(tempfile::TempDir),
}

impl WorkspaceGuard {
    pub fn path(&self) -> &Path {
        match self {
            WorkspaceGuard::Persistent(p) => p,
            WorkspaceGuard::Ephemeral(dir) => dir.path(),
        }
    }

    /// Deterministic path under `<data_dir>/workspaces/<session_id>`,
    /// created if absent.
    pub fn persistent(data_dir: &Path, session_id: &str) -> std::io::Result<Self> {
        let path = data_dir.join("workspaces").join(session_id);
        std::fs::create_dir_all(&path)?;
        Ok(WorkspaceGuard::Persistent(path))
    }

    /// `mkdtemp`-style directory under the OS temp area, deleted when this
    /// guard is dropped.
    pub fn ephemeral() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("ax-completion-").tempdir()?;
        Ok(WorkspaceGuard::Ephemeral(dir))
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, WorkspaceGuard::Ephemeral(_))
    }
}

/// Per-session scratch directory, always ephemeral — removed explicitly by
/// the pipeline's finally clause regardless of session persistence, since
/// scratch space is never part of the durable workspace.
pub struct ScratchGuard(PathBuf);

impl ScratchGuard {
    pub fn create(data_dir: &Path, session_id: &str) -> std::io::Result<Self> {
        let path = data_dir.join("workspaces").join(session_id).join("scratch");
        std::fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn remove(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, path = %self.0.display(), "failed to remove scratch directory");
            }
        }
    }
}

/// Copies every `*.md` from the host skills directory into
/// `<workspace>/skills`, deleting any workspace file with no host
/// counterpart — a small rsync-lite diff, not a generic sync crate, since
/// the source set is always flat `.md` files.
pub fn refresh_skills(host_skills_dir: &Path, workspace: &Path) -> std::io::Result<()> {
    let dest = workspace.join("skills");
    std::fs::create_dir_all(&dest)?;

    let mut host_names = std::collections::HashSet::new();
    if host_skills_dir.is_dir() {
        for entry in std::fs::read_dir(host_skills_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_name() else { continue };
            host_names.insert(name.to_os_string());
            std::fs::copy(&path, dest.join(name))?;
        }
    }

    for entry in std::fs::read_dir(&dest)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        if !host_names.contains(name) {
            std::fs::remove_file(&path)?;
        }
    }

    Ok(())
}

/// A persistent workspace is inactive if its directory hasn't been touched
/// in this long. spec.md §3 Lifecycles: "persistent workspaces ... are
/// GC'd after 7 days of inactivity."
pub const STALE_WORKSPACE_AFTER: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);

/// Removes every `<data_dir>/workspaces/<session>` directory whose mtime is
/// older than [`STALE_WORKSPACE_AFTER`]. Returns the session ids removed.
/// A directory's mtime is refreshed implicitly by `refresh_skills` and any
/// sandbox write under it, so an active session is never swept.
pub fn gc_stale_workspaces(data_dir: &Path, now: std::time::SystemTime) -> std::io::Result<Vec<String>> {
    let root = data_dir.join("workspaces");
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = match metadata.modified() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let age = match now.duration_since(modified) {
            Ok(age) => age,
            Err(_) => continue, // mtime in the future: treat as fresh
        };
        if age < STALE_WORKSPACE_AFTER {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let session_id = name.to_string();
        if let Err(e) = std::fs::remove_dir_all(&path) {
            warn!(error = %e, session_id, "failed to remove stale workspace");
            continue;
        }
        removed.push(session_id);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_leaves_a_workspace_younger_than_the_retention_window_alone() {
        let data_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::persistent(data_dir.path(), "active-session").unwrap();
        let created_at = std::time::SystemTime::now();
        let probe = created_at + STALE_WORKSPACE_AFTER - std::time::Duration::from_secs(60);
        let removed = gc_stale_workspaces(data_dir.path(), probe).unwrap();
        assert!(removed.is_empty());
        assert!(guard.path().exists());
    }

    #[test]
    fn gc_removes_a_workspace_older_than_the_retention_window() {
        let data_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::persistent(data_dir.path(), "stale-session").unwrap();
        let created_at = std::time::SystemTime::now();
        let probe = created_at + STALE_WORKSPACE_AFTER + std::time::Duration::from_secs(60);
        let removed = gc_stale_workspaces(data_dir.path(), probe).unwrap();
        assert_eq!(removed, vec!["stale-session".to_string()]);
        assert!(!guard.path().exists());
    }

    #[test]
    fn ephemeral_workspace_is_removed_on_drop() {
        let path = {
            let guard = WorkspaceGuard::ephemeral().unwrap();
            let p = guard.path().to_path_buf();
            assert!(p.exists());
            p
        };
        assert!(!path.exists());
    }

    #[test]
    fn persistent_workspace_survives_the_guard() {
        let data_dir = tempfile::tempdir().unwrap();
        let path = {
            let guard = WorkspaceGuard::persistent(data_dir.path(), "s1").unwrap();
            guard.path().to_path_buf()
        };
        assert!(path.exists());
    }

    #[test]
    fn refresh_skills_copies_and_prunes_orphans() {
        let host = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("a.md"), "skill a").unwrap();
        refresh_skills(host.path(), ws.path()).unwrap();
        assert!(ws.path().join("skills/a.md").exists());

        std::fs::remove_file(host.path().join("a.md")).unwrap();
        std::fs::write(host.path().join("b.md"), "skill b").unwrap();
        refresh_skills(host.path(), ws.path()).unwrap();
        assert!(!ws.path().join("skills/a.md").exists());
        assert!(ws.path().join("skills/b.md").exists());
    }
}
