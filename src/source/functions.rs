use std::collections::BTreeSet;

use crate::util::static_regex;

static_regex!(
    fn signature_re,
    r"\b(?:(?:static|inline|extern|const)\s+)*(?:(?:unsigned|signed)\s+)?(?:long\s+long|long|int|void|char|float|double|short|bool|_Bool|size_t|struct\s+\w+)(?:\s+int)?(?:\s*\*+\s*|\s+)(\w+)\s*\("
);

const NOT_A_NAME: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "return", "sizeof", "goto", "break",
    "continue", "int", "void", "char", "float", "double", "long", "short", "unsigned", "signed",
    "struct", "static", "const", "inline",
];

/// Names of every function declared or defined with a recognizable signature.
pub fn function_names(code: &str) -> BTreeSet<String> {
    signature_re()
        .captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !NOT_A_NAME.contains(name))
        .map(str::to_string)
        .collect()
}

/// [`function_names`] without the entry point.
pub fn non_main_function_names(code: &str) -> BTreeSet<String> {
    let mut names = function_names(code);
    names.remove("main");
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_common_signatures() {
        let code = r#"
static int helper(int x) { return x; }
unsigned long long big(void);
char *dup(const char *s) { return 0; }
struct node* make_node(int v) { return 0; }
void run(void) {}
int main(void) { return helper(1); }
"#;
        let names = function_names(code);
        for expected in ["helper", "big", "dup", "make_node", "run", "main"] {
            assert!(names.contains(expected), "missing {expected}");
        }
        assert!(!non_main_function_names(code).contains("main"));
    }

    #[test]
    fn test_ignores_calls_and_control_flow() {
        let code = "int main() {\n  if (x) { foo(1); }\n  while (y) {}\n  return bar(2);\n}";
        let names = non_main_function_names(code);
        assert!(names.is_empty(), "{names:?}");
    }
}
