//! Line-level heuristics over C source text.
//!
//! Nothing here parses C. Every decision is a textual scan, which is all the
//! repair loop needs to tell a surgical edit from a rewrite.

mod extract;
mod functions;
mod memory;

pub use extract::extract_c_code;
pub use functions::{function_names, non_main_function_names};
pub use memory::{MemoryFacts, PointerDecl};

use crate::util::static_regex;

static_regex!(fn line_prefix_re, r"^\s*\d+\s*:\s?");

/// Lines with at least one non-whitespace character.
pub fn non_blank_lines(code: &str) -> impl Iterator<Item = &str> {
    code.lines().filter(|line| !line.trim().is_empty())
}

/// Number of lines as an editor would count them.
pub fn line_count(code: &str) -> usize {
    code.lines().count()
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form used for no-op detection: trimmed lines, blanks dropped,
/// internal whitespace collapsed.
pub fn normalize_whitespace(code: &str) -> String {
    non_blank_lines(code)
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render code with `NNN: ` prefixes for the analyzer prompt.
pub fn add_line_numbers(code: &str) -> String {
    code.lines()
        .enumerate()
        .map(|(idx, line)| format!("{:3}: {}", idx + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Undo [`add_line_numbers`] when a model echoes the numbered listing back.
///
/// Only strips when every non-blank line carries a prefix; a file with a
/// single `case 1:` label must not lose it.
pub fn strip_line_number_prefixes(code: &str) -> String {
    let re = line_prefix_re();
    let mut any = false;
    for line in non_blank_lines(code) {
        if !re.is_match(line) {
            return code.to_string();
        }
        any = true;
    }
    if !any {
        return code.to_string();
    }
    code.lines()
        .map(|line| re.replace(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `needle` appears as one of the program's whole lines after
/// whitespace normalization, or as a contiguous run of them for multi-line
/// anchors. A fragment of a line never matches.
pub fn contains_line(code: &str, needle: &str) -> bool {
    let wanted: Vec<String> = non_blank_lines(needle).map(normalize_line).collect();
    if wanted.is_empty() {
        return false;
    }
    let lines: Vec<String> = non_blank_lines(code).map(normalize_line).collect();
    lines.windows(wanted.len()).any(|window| window == wanted.as_slice())
}
