//! File operations backing `workspace_write`/`workspace_read`/`workspace_list`.
//! Every path is joined under a tier directory resolved by
//! [`crate::context::RequestContext::workspace_dir`] — the `path` field
//! already passed `ax_schema`'s `Identifier` check (no `..`, no leading
//! punctuation), so a single join is sufficient to stay inside the tier.

use std::path::Path;

pub fn write(tier_dir: &Path, rel_path: &str, content: &str) -> std::io::Result<()> {
    let full = tier_dir.join(rel_path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full, content)
}

pub fn read(tier_dir: &Path, rel_path: &str) -> std::io::Result<Option<String>> {
    let full = tier_dir.join(rel_path);
    match std::fs::read_to_string(full) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list(tier_dir: &Path, rel_path: Option<&str>) -> std::io::Result<Vec<String>> {
    let dir = match rel_path {
        Some(p) => tier_dir.join(p),
        None => tier_dir.to_path_buf(),
    };
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.md", "hello").unwrap();
        assert_eq!(read(dir.path(), "notes.md").unwrap().unwrap(), "hello");
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), "nope.md").unwrap().is_none());
    }

    #[test]
    fn write_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sub/dir/file.md", "x").unwrap();
        assert_eq!(list(dir.path(), Some("sub/dir")).unwrap(), vec!["file.md"]);
    }

    #[test]
    fn list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list(dir.path(), Some("nope")).unwrap().is_empty());
    }
}
