//! Analyzer feedback reports and active-report selection.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::source::non_blank_lines;
use crate::util::read_non_empty;

/// Which analyzer produced a report. Declaration order is selection priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSource {
    Klee,
    Compile,
    CodeQl,
}

impl FeedbackSource {
    pub const PRIORITY: [FeedbackSource; 3] =
        [FeedbackSource::Klee, FeedbackSource::Compile, FeedbackSource::CodeQl];

    pub fn file_name(self, code_id: u32) -> String {
        let tool = match self {
            FeedbackSource::Klee => "klee",
            FeedbackSource::Compile => "compile",
            FeedbackSource::CodeQl => "codeql",
        };
        format!("feedback_{tool}_code_{code_id}.txt")
    }
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeedbackSource::Klee => "klee",
            FeedbackSource::Compile => "compile",
            FeedbackSource::CodeQl => "codeql",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackReport {
    pub source: FeedbackSource,
    pub path: PathBuf,
    pub text: String,
}

impl FeedbackReport {
    /// Too little signal to drive a repair: at most one non-blank line, and
    /// that line mentions neither an error nor a warning.
    pub fn is_ambiguous(&self) -> bool {
        is_ambiguous(&self.text)
    }
}

pub fn is_ambiguous(text: &str) -> bool {
    let mut lines = non_blank_lines(text);
    let first = lines.next();
    if lines.next().is_some() {
        return false;
    }
    match first {
        None => true,
        Some(line) => {
            let lower = line.to_lowercase();
            !lower.contains("error") && !lower.contains("warning")
        }
    }
}

/// Highest-priority non-empty report for `code_id` in `feedback_dir`.
pub fn select_active(feedback_dir: &Path, code_id: u32) -> anyhow::Result<Option<FeedbackReport>> {
    for source in FeedbackSource::PRIORITY {
        let path = feedback_dir.join(source.file_name(code_id));
        if let Some(text) = read_non_empty(&path)? {
            return Ok(Some(FeedbackReport { source, path, text }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_klee_wins_over_compile_and_codeql() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("feedback_compile_code_4.txt"), "error: x").unwrap();
        fs::write(dir.path().join("feedback_klee_code_4.txt"), "KLEE: ERROR: out of bound").unwrap();
        fs::write(dir.path().join("feedback_codeql_code_4.txt"), "1 issues found").unwrap();

        let report = select_active(dir.path(), 4).unwrap().unwrap();
        assert_eq!(report.source, FeedbackSource::Klee);
    }

    #[test]
    fn test_empty_reports_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("feedback_klee_code_4.txt"), "\n  \n").unwrap();
        fs::write(dir.path().join("feedback_codeql_code_4.txt"), "warning: leak").unwrap();

        let report = select_active(dir.path(), 4).unwrap().unwrap();
        assert_eq!(report.source, FeedbackSource::CodeQl);
    }

    #[test]
    fn test_no_reports_is_none() {
        let dir = tempdir().unwrap();
        assert!(select_active(dir.path(), 9).unwrap().is_none());
    }

    #[test]
    fn test_ambiguity() {
        assert!(is_ambiguous("CodeQL results for code_3"));
        assert!(is_ambiguous(""));
        assert!(!is_ambiguous("code_3.c:4: warning: unused variable"));
        assert!(!is_ambiguous("Summary\nsomething happened"));
    }
}
