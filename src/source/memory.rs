use serde::Serialize;

use super::normalize_line;
use crate::util::static_regex;

static_regex!(
    fn pointer_decl_re,
    r"^\s*(?:(?:static|extern|const|volatile|unsigned|signed)\s+)*(?:long\s+long|long|int|void|char|float|double|short|bool|_Bool|size_t|struct\s+\w+)\s*\*"
);
static_regex!(fn declarator_name_re, r"\*+\s*(\w+)");
static_regex!(fn alloc_call_re, r"\b(?:malloc|calloc|realloc)\s*\(");
static_regex!(
    fn alloc_target_re,
    r"(\w+)\s*(?:\[[^\]]*\])?\s*=\s*(?:\([^)]*\)\s*)?(?:malloc|calloc|realloc)\s*\("
);
static_regex!(fn free_call_re, r"\bfree\s*\(\s*(?:\([^)]*\)\s*)?(\w+)\s*\)");
static_regex!(fn sizeof_re, r"sizeof\s*\([^)]*\)|sizeof\s+\w+");
static_regex!(fn identifier_re, r"[A-Za-z_]\w*");

/// A raw pointer declared at file scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointerDecl {
    pub names: Vec<String>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocSite {
    pub target: Option<String>,
    pub input_sized: bool,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeSite {
    pub target: String,
    pub line: String,
}

/// What the program does with heap memory, as far as a line scan can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryFacts {
    pub global_pointers: Vec<PointerDecl>,
    pub allocations: Vec<AllocSite>,
    pub frees: Vec<FreeSite>,
}

impl MemoryFacts {
    pub fn scan(code: &str) -> Self {
        let mut facts = MemoryFacts::default();
        let mut depth: i64 = 0;

        for raw in code.lines() {
            let line = strip_line_comment(raw);
            if line.trim().is_empty() {
                continue;
            }
            let normalized = normalize_line(raw);

            if depth == 0 {
                if let Some(decl) = global_pointer_decl(line) {
                    facts.global_pointers.push(PointerDecl {
                        names: decl,
                        line: normalized.clone(),
                    });
                }
            }

            if let Some(call) = alloc_call_re().find(line) {
                let target = alloc_target_re()
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string());
                facts.allocations.push(AllocSite {
                    target,
                    input_sized: size_depends_on_variable(&line[call.end()..]),
                    line: normalized.clone(),
                });
            }

            for caps in free_call_re().captures_iter(line) {
                if let Some(target) = caps.get(1) {
                    facts.frees.push(FreeSite {
                        target: target.as_str().to_string(),
                        line: normalized.clone(),
                    });
                }
            }

            depth += brace_delta(line);
            depth = depth.max(0);
        }

        facts
    }

    pub fn has_global_pointer(&self) -> bool {
        !self.global_pointers.is_empty()
    }

    pub fn has_allocation(&self) -> bool {
        !self.allocations.is_empty()
    }

    pub fn has_input_sized_allocation(&self) -> bool {
        self.allocations.iter().any(|site| site.input_sized)
    }

    /// The program exhibits the heap model a memory fix exists to remove.
    pub fn needs_memory_fix(&self) -> bool {
        self.has_global_pointer() || self.has_input_sized_allocation()
    }

    /// Nothing heap-related to fix, so a memory section must stay empty.
    pub fn forbids_memory_fix(&self) -> bool {
        !self.has_global_pointer() && !self.has_allocation()
    }

    /// Normalized lines a complete memory fix has to remove or rewrite:
    /// global pointer declarations, input-sized allocations, and frees of
    /// either.
    pub fn lines_requiring_rewrite(&self) -> Vec<String> {
        let mut owned: Vec<&str> = self
            .global_pointers
            .iter()
            .flat_map(|decl| decl.names.iter().map(String::as_str))
            .collect();
        owned.extend(
            self.allocations
                .iter()
                .filter(|site| site.input_sized)
                .filter_map(|site| site.target.as_deref()),
        );

        let mut lines: Vec<String> = Vec::new();
        let mut push = |line: &str| {
            if !lines.iter().any(|existing| existing == line) {
                lines.push(line.to_string());
            }
        };
        for decl in &self.global_pointers {
            push(&decl.line);
        }
        for site in self.allocations.iter().filter(|site| site.input_sized) {
            push(&site.line);
        }
        for site in self.frees.iter().filter(|site| owned.contains(&site.target.as_str())) {
            push(&site.line);
        }
        lines
    }
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn global_pointer_decl(line: &str) -> Option<Vec<String>> {
    if !pointer_decl_re().is_match(line) || !line.trim_end().ends_with(';') {
        return None;
    }
    let head = line.split('=').next().unwrap_or(line);
    if head.contains('(') {
        return None;
    }
    let names: Vec<String> = declarator_name_re()
        .captures_iter(head)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    (!names.is_empty()).then_some(names)
}

/// True when the argument list of an allocation mentions anything other
/// than literals and `sizeof` expressions.
fn size_depends_on_variable(args_onward: &str) -> bool {
    let mut depth = 1usize;
    let mut end = args_onward.len();
    for (idx, ch) in args_onward.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    end = idx;
                    break;
                }
            }
            _ => {}
        }
    }
    let args = sizeof_re().replace_all(&args_onward[..end], "");
    identifier_re()
        .find_iter(&args)
        .any(|m| !matches!(m.as_str(), "NULL" | "u" | "U" | "l" | "L" | "ul" | "UL"))
}

fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    let mut in_string = false;
    let mut in_char = false;
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string || in_char => escaped = true,
            '"' if !in_char => in_string = !in_string,
            '\'' if !in_string => in_char = !in_char,
            '{' if !in_string && !in_char => delta += 1,
            '}' if !in_string && !in_char => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAP_PROGRAM: &str = r#"#include <stdlib.h>
int *arr;
int main() {
    int n;
    scanf("%d", &n);
    arr = malloc(n * sizeof(int));
    free(arr);
    return 0;
}
"#;

    #[test]
    fn test_scan_finds_global_pointer_alloc_and_free() {
        let facts = MemoryFacts::scan(HEAP_PROGRAM);
        assert_eq!(facts.global_pointers.len(), 1);
        assert_eq!(facts.global_pointers[0].names, vec!["arr"]);
        assert!(facts.has_input_sized_allocation());
        assert!(facts.needs_memory_fix());
        assert_eq!(
            facts.lines_requiring_rewrite(),
            vec![
                "int *arr;".to_string(),
                "arr = malloc(n * sizeof(int));".to_string(),
                "free(arr);".to_string(),
            ]
        );
    }

    #[test]
    fn test_local_pointer_is_not_global() {
        let code = "int main() {\n    int *p;\n    return 0;\n}\n";
        let facts = MemoryFacts::scan(code);
        assert!(!facts.has_global_pointer());
        assert!(facts.forbids_memory_fix());
    }

    #[test]
    fn test_constant_size_allocation_is_not_input_sized() {
        let code = "int main() {\n    char *buf = malloc(16 * sizeof(char));\n    free(buf);\n}\n";
        let facts = MemoryFacts::scan(code);
        assert!(facts.has_allocation());
        assert!(!facts.has_input_sized_allocation());
        assert!(!facts.needs_memory_fix());
        assert!(!facts.forbids_memory_fix());
    }

    #[test]
    fn test_pointer_returning_prototype_is_not_a_global() {
        let facts = MemoryFacts::scan("char *dup(const char *s);\n");
        assert!(!facts.has_global_pointer());
    }
}
