use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::util::{read_optional, static_regex};

static_regex!(fn issues_found_re, r"(?i)\b(\d+)\s+issues?\s+found");

const CRASH_TOKENS: &[&str] = &[
    "halt timer",
    "timeout",
    "timed out",
    "segmentation fault",
    "core dumped",
    "killed",
    "stack overflow",
];

/// Analyzer outcomes for one `code_id` in one iteration directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardSignals {
    pub compile_ok: bool,
    pub klee_errors: usize,
    pub klee_test_cases: usize,
    pub klee_crashed: bool,
    pub codeql_issues: usize,
    pub compiler_warnings: usize,
}

impl Default for RewardSignals {
    /// The optimistic reading used for any source that is absent.
    fn default() -> Self {
        Self {
            compile_ok: true,
            klee_errors: 0,
            klee_test_cases: 0,
            klee_crashed: false,
            codeql_issues: 0,
            compiler_warnings: 0,
        }
    }
}

impl RewardSignals {
    pub fn collect(iter_dir: &Path, code_id: u32) -> anyhow::Result<Self> {
        let mut signals = RewardSignals::default();

        let failures = iter_dir.join("compiled_output").join("compile_failures.txt");
        if let Some(text) = read_optional(&failures)? {
            signals.compile_ok = !lists_code_id(&text, code_id);
        }

        let klee_dir = iter_dir.join("klee_output").join(format!("code_{code_id}"));
        if klee_dir.is_dir() {
            scan_klee_dir(&klee_dir, &mut signals)?;
        }

        let feedback = iter_dir.join("feedback");
        if let Some(text) = read_optional(&feedback.join(format!("code_{code_id}_codeql.txt")))? {
            signals.codeql_issues = parse_codeql_issues(&text);
        }
        if let Some(text) =
            read_optional(&feedback.join(format!("feedback_compile_code_{code_id}.txt")))?
        {
            signals.compiler_warnings = text.lines().filter(|l| l.contains("warning:")).count();
        }

        Ok(signals)
    }
}

/// `code_<id>` followed by whitespace or end of text, so `code_1` does not
/// match `code_12`.
pub fn lists_code_id(failures: &str, code_id: u32) -> bool {
    let needle = format!("code_{code_id}");
    failures.match_indices(&needle).any(|(idx, _)| {
        let preceded_ok = failures[..idx]
            .chars()
            .next_back()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        let rest = &failures[idx + needle.len()..];
        let followed_ok = rest.chars().next().map(char::is_whitespace).unwrap_or(true);
        preceded_ok && followed_ok
    })
}

/// Count from an `N issues found` summary. Present but unparseable counts as
/// one issue.
pub fn parse_codeql_issues(text: &str) -> usize {
    issues_found_re()
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(1)
}

fn scan_klee_dir(dir: &Path, signals: &mut RewardSignals) -> anyhow::Result<()> {
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_lowercase();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "err" => {
                if name.contains("mock") {
                    continue;
                }
                let content = read_optional(path)?.unwrap_or_default().to_lowercase();
                if !content.contains("mock") {
                    signals.klee_errors += 1;
                }
            }
            "ktest" => signals.klee_test_cases += 1,
            _ => {
                let is_log = ext == "log" || matches!(name.as_str(), "messages.txt" | "warnings.txt" | "info");
                if is_log && !signals.klee_crashed {
                    let content = read_optional(path)?.unwrap_or_default().to_lowercase();
                    signals.klee_crashed = CRASH_TOKENS.iter().any(|t| content.contains(t));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_lists_code_id_respects_boundaries() {
        let text = "code_12 failed\ncode_3\n";
        assert!(lists_code_id(text, 12));
        assert!(lists_code_id(text, 3));
        assert!(!lists_code_id(text, 1));
        assert!(!lists_code_id("code_1.c failed", 1));
    }

    #[test]
    fn test_parse_codeql_issues() {
        assert_eq!(parse_codeql_issues("code_4.c — 0 issues found"), 0);
        assert_eq!(parse_codeql_issues("3 issues found"), 3);
        assert_eq!(parse_codeql_issues("analysis crashed"), 1);
    }

    #[test]
    fn test_missing_sources_are_optimistic() {
        let dir = tempdir().unwrap();
        assert_eq!(RewardSignals::collect(dir.path(), 5).unwrap(), RewardSignals::default());
    }

    #[test]
    fn test_collects_all_sources() {
        let dir = tempdir().unwrap();
        let iter = dir.path();
        fs::create_dir_all(iter.join("compiled_output")).unwrap();
        fs::write(iter.join("compiled_output/compile_failures.txt"), "code_5\n").unwrap();

        let klee = iter.join("klee_output/code_5/klee-out-0");
        fs::create_dir_all(&klee).unwrap();
        fs::write(klee.join("test000001.ptr.err"), "Error: memory error").unwrap();
        fs::write(klee.join("test000002.mock.err"), "ignored").unwrap();
        fs::write(klee.join("test000003.exec.err"), "MOCK harness failure").unwrap();
        fs::write(klee.join("test000001.ktest"), [0u8; 4]).unwrap();
        fs::write(klee.join("test000002.ktest"), [0u8; 4]).unwrap();
        fs::write(klee.join("messages.txt"), "KLEE: HaltTimer invoked\nKLEE: halt timer").unwrap();

        fs::create_dir_all(iter.join("feedback")).unwrap();
        fs::write(iter.join("feedback/code_5_codeql.txt"), "2 issues found").unwrap();
        fs::write(
            iter.join("feedback/feedback_compile_code_5.txt"),
            "a.c:1: warning: x\na.c:2: warning: y\na.c:3: note: z",
        )
        .unwrap();

        let signals = RewardSignals::collect(iter, 5).unwrap();
        assert_eq!(
            signals,
            RewardSignals {
                compile_ok: false,
                klee_errors: 1,
                klee_test_cases: 2,
                klee_crashed: true,
                codeql_issues: 2,
                compiler_warnings: 2,
            }
        );
    }
}
