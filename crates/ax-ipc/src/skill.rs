//! `skill_list`/`skill_read`: skills are plain `*.md` files under
//! `<data_dir>/skills/`. `skill_propose` never writes here directly — it
//! always goes through [`crate::proposal`].

use std::path::Path;

pub fn list(skills_dir: &Path) -> std::io::Result<Vec<String>> {
    if !skills_dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(skills_dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
            if let Some(stem) = entry.path().file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub fn read(skills_dir: &Path, name: &str) -> std::io::Result<Option<String>> {
    let path = skills_dir.join(format!("{name}.md"));
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_markdown_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weather.md"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(list(dir.path()).unwrap(), vec!["weather"]);
    }

    #[test]
    fn reads_by_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weather.md"), "content").unwrap();
        assert_eq!(read(dir.path(), "weather").unwrap().unwrap(), "content");
    }
}
