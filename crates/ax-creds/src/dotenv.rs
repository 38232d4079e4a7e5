//! Surgical `.env` rewriting: only the named keys are touched, in place,
//! preserving comments, blank lines, ordering, and every other key. Not a
//! job for a generic templating crate — the requirement is "rewrite three
//! lines", not "render a template".

use std::path::Path;

/// Rewrite (or append) `KEY=value` lines in the file at `path` for every
/// `(key, value)` pair in `updates`. Keys not already present are appended
/// at the end. Missing file is treated as empty (creates a new file).
pub fn rewrite_env_file(path: &Path, updates: &[(&str, &str)]) -> std::io::Result<()> {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut seen = vec![false; updates.len()];
    let mut out_lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            out_lines.push(line.to_string());
            continue;
        }
        let key = trimmed.split('=').next().unwrap_or("").trim();
        if let Some(idx) = updates.iter().position(|(k, _)| *k == key) {
            out_lines.push(format!("{}={}", key, updates[idx].1));
            seen[idx] = true;
        } else {
            out_lines.push(line.to_string());
        }
    }

    for (idx, (key, value)) in updates.iter().enumerate() {
        if !seen[idx] {
            out_lines.push(format!("{key}={value}"));
        }
    }

    let mut content = out_lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_existing_key_preserving_other_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nFOO=1\nACCESS_TOKEN=old\nBAR=2\n").unwrap();

        rewrite_env_file(&path, &[("ACCESS_TOKEN", "new")]).unwrap();

        let out = std::fs::read_to_string(&path).unwrap();
        assert!(out.contains("# comment"));
        assert!(out.contains("FOO=1"));
        assert!(out.contains("ACCESS_TOKEN=new"));
        assert!(!out.contains("ACCESS_TOKEN=old"));
        assert!(out.contains("BAR=2"));
    }

    #[test]
    fn appends_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "FOO=1\n").unwrap();

        rewrite_env_file(&path, &[("NEW_KEY", "value")]).unwrap();

        let out = std::fs::read_to_string(&path).unwrap();
        assert!(out.contains("FOO=1"));
        assert!(out.contains("NEW_KEY=value"));
    }

    #[test]
    fn missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite_env_file(&path, &[("A", "1")]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "A=1");
    }
}
