use anyhow::Context;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Declare a function returning a lazily compiled, process-wide regex.
macro_rules! static_regex {
    ($vis:vis fn $name:ident, $pattern:expr) => {
        $vis fn $name() -> &'static regex::Regex {
            static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            RE.get_or_init(|| regex::Regex::new($pattern).expect("static regex pattern is valid"))
        }
    };
}
pub(crate) use static_regex;

pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Read a UTF-8 text file, mapping "not found" to `None`.
///
/// Invalid UTF-8 is replaced rather than rejected; analyzer output routinely
/// carries stray bytes.
pub fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read '{}'", path.display())),
    }
}

/// Like [`read_optional`] but treats whitespace-only files as absent.
pub fn read_non_empty(path: &Path) -> anyhow::Result<Option<String>> {
    Ok(read_optional(path)?.filter(|text| !text.trim().is_empty()))
}

/// Append one JSON record per line.
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open '{}' for append", path.display()))?;
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())
        .with_context(|| format!("Failed to append to '{}'", path.display()))?;
    Ok(())
}

/// Write `content` to `path` via a sibling temp file and rename.
///
/// # Platform Notes
/// - **Unix**: `rename()` is atomic.
/// - **Windows**: the destination is moved aside to `.bak` first because
///   `rename()` refuses to overwrite. A crash between the two renames leaves
///   the `.bak` file for recovery.
pub fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write '{}'", tmp_path.display()))?;

    #[cfg(windows)]
    {
        let backup_path = path.with_extension("bak");
        if backup_path.exists() {
            let _ = fs::remove_file(&backup_path);
        }
        if path.exists() {
            if let Err(err) = fs::rename(path, &backup_path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(err.into());
            }
        }
        if let Err(err) = fs::rename(&tmp_path, path) {
            if backup_path.exists() {
                let _ = fs::rename(&backup_path, path);
            }
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        if backup_path.exists() {
            let _ = fs::remove_file(&backup_path);
        }
        return Ok(());
    }

    #[cfg(not(windows))]
    {
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err)
                .with_context(|| format!("Failed to move temp file into '{}'", path.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_truncate_unicode_safe() {
        assert_eq!(truncate("错误: 失败 😊", 5), "错误...");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[test]
    fn test_read_optional_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent.txt")).unwrap().is_none());
    }

    #[test]
    fn test_read_non_empty_skips_whitespace_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, "  \n\t\n").unwrap();
        assert!(read_non_empty(&path).unwrap().is_none());
    }

    #[test]
    fn test_write_atomic_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, "[1]").unwrap();
        write_atomic(&path, "[1,2]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_append_jsonl_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        append_jsonl(&path, &[serde_json::json!({"a": 1})]).unwrap();
        append_jsonl(&path, &[serde_json::json!({"a": 2})]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
