//! On-disk layout of one pipeline iteration.
//!
//! ```text
//! <run>/iter_<n>/cleaned_code/code_<id>.c
//! <run>/iter_<n>/generated_code/{code_<id>.c, repair_prompt_<id>.txt}
//! <run>/iter_<n>/feedback/...
//! <run>/iter_<n>/compiled_output/compile_failures.txt
//! <run>/iter_<n>/klee_output/code_<id>/**
//! ```

use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::static_regex;

static_regex!(fn iteration_name_re, r"^iter_(\d+)$");
static_regex!(fn code_file_re, r"^code_(\d+)\.c$");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationDir {
    pub run_id: String,
    pub iteration: u32,
    pub path: PathBuf,
}

impl IterationDir {
    /// Wrap `path` if its name is `iter_<n>`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let iteration = iteration_name_re()
            .captures(name)
            .and_then(|caps| caps[1].parse().ok())?;
        let run_id = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Self {
            run_id,
            iteration,
            path: path.to_path_buf(),
        })
    }

    /// All `iter_<n>` folders directly under `run_dir`, by iteration.
    pub fn list(run_dir: &Path) -> anyhow::Result<Vec<IterationDir>> {
        let mut dirs: Vec<IterationDir> = fs::read_dir(run_dir)
            .with_context(|| format!("Failed to list '{}'", run_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| IterationDir::from_path(&entry.path()))
            .collect();
        dirs.sort_by_key(|dir| dir.iteration);
        Ok(dirs)
    }

    pub fn cleaned_code_dir(&self) -> PathBuf {
        self.path.join("cleaned_code")
    }

    pub fn generated_code_dir(&self) -> PathBuf {
        self.path.join("generated_code")
    }

    pub fn feedback_dir(&self) -> PathBuf {
        self.path.join("feedback")
    }

    pub fn cleaned_code(&self, code_id: u32) -> PathBuf {
        self.cleaned_code_dir().join(format!("code_{code_id}.c"))
    }

    pub fn generated_code(&self, code_id: u32) -> PathBuf {
        self.generated_code_dir().join(format!("code_{code_id}.c"))
    }

    pub fn repair_prompt(&self, code_id: u32) -> PathBuf {
        self.generated_code_dir().join(format!("repair_prompt_{code_id}.txt"))
    }

    /// Code ids present in either code folder.
    pub fn code_ids(&self) -> BTreeSet<u32> {
        let mut ids = BTreeSet::new();
        for dir in [self.cleaned_code_dir(), self.generated_code_dir()] {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if let Some(id) = code_file_re()
                    .captures(name)
                    .and_then(|caps| caps[1].parse().ok())
                {
                    ids.insert(id);
                }
            }
        }
        ids
    }
}

/// Parse `code_<id>` directory or file stems.
pub fn parse_code_id(name: &str) -> Option<u32> {
    name.strip_prefix("code_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_and_code_ids() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_2024");
        for name in ["iter_2", "iter_1", "iter_x", "notes"] {
            fs::create_dir_all(run.join(name)).unwrap();
        }
        let iters = IterationDir::list(&run).unwrap();
        assert_eq!(iters.iter().map(|d| d.iteration).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(iters[0].run_id, "run_2024");

        let iter = &iters[0];
        fs::create_dir_all(iter.cleaned_code_dir()).unwrap();
        fs::create_dir_all(iter.generated_code_dir()).unwrap();
        fs::write(iter.cleaned_code(3), "").unwrap();
        fs::write(iter.generated_code(12), "").unwrap();
        fs::write(iter.repair_prompt(12), "").unwrap();
        fs::write(iter.generated_code_dir().join("raw_code_5.txt"), "").unwrap();
        assert_eq!(iter.code_ids().into_iter().collect::<Vec<_>>(), vec![3, 12]);
    }

    #[test]
    fn test_parse_code_id() {
        assert_eq!(parse_code_id("code_245"), Some(245));
        assert_eq!(parse_code_id("code_x"), None);
        assert_eq!(parse_code_id("iter_3"), None);
    }
}
