//! Structural health filter for candidate repairs.
//!
//! Keeps "fixes" that delete the program's functionality out of the
//! training data, however well they score.

use serde::Serialize;

use crate::config::HealthConfig;
use crate::source::{non_blank_lines, non_main_function_names};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HealthViolation {
    TooShort { current_lines: usize, fixed_lines: usize, minimum: usize },
    AllFunctionsRemoved { removed: Vec<String> },
    TooFewFunctionsKept { kept: usize, required: usize },
}

impl std::fmt::Display for HealthViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthViolation::TooShort {
                current_lines,
                fixed_lines,
                minimum,
            } => write!(
                f,
                "fixed code shrank to {fixed_lines} lines from {current_lines} (minimum {minimum})"
            ),
            HealthViolation::AllFunctionsRemoved { removed } => {
                write!(f, "every helper function removed: {}", removed.join(", "))
            }
            HealthViolation::TooFewFunctionsKept { kept, required } => {
                write!(f, "only {kept} helper functions kept, {required} required")
            }
        }
    }
}

pub fn check_health(
    current: &str,
    fixed: &str,
    config: &HealthConfig,
) -> Result<(), HealthViolation> {
    let current_lines = non_blank_lines(current).count();
    let fixed_lines = non_blank_lines(fixed).count();
    if current_lines >= config.min_current_lines {
        let threshold =
            (config.min_fixed_lines as f64).max(current_lines as f64 * config.min_line_ratio);
        if (fixed_lines as f64) < threshold {
            return Err(HealthViolation::TooShort {
                current_lines,
                fixed_lines,
                minimum: threshold.ceil() as usize,
            });
        }
    }

    let before = non_main_function_names(current);
    if before.is_empty() {
        return Ok(());
    }
    let after = non_main_function_names(fixed);
    if after.is_empty() {
        return Err(HealthViolation::AllFunctionsRemoved {
            removed: before.into_iter().collect(),
        });
    }
    let kept = before.intersection(&after).count();
    let threshold = before.len() as f64 * config.min_function_survival;
    if (kept as f64) < threshold {
        return Err(HealthViolation::TooFewFunctionsKept {
            kept,
            required: threshold.ceil() as usize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(helpers: &[&str], body_lines: usize) -> String {
        let mut code = String::from("#include <stdio.h>\n");
        for name in helpers {
            code.push_str(&format!("int {name}(int x) {{\n    return x;\n}}\n"));
        }
        code.push_str("int main() {\n");
        for i in 0..body_lines {
            code.push_str(&format!("    printf(\"%d\\n\", {i});\n"));
        }
        code.push_str("    return 0;\n}\n");
        code
    }

    #[test]
    fn test_healthy_fix_passes() {
        let current = program(&["a", "b"], 6);
        let fixed = program(&["a", "b"], 5);
        assert_eq!(check_health(&current, &fixed, &HealthConfig::default()), Ok(()));
    }

    #[test]
    fn test_shrunk_fix_rejected() {
        let current = program(&["a"], 16);
        let fixed = program(&["a"], 1);
        assert!(matches!(
            check_health(&current, &fixed, &HealthConfig::default()),
            Err(HealthViolation::TooShort { minimum: 12, .. })
        ));
    }

    #[test]
    fn test_line_threshold_is_not_rounded_down() {
        // 11 non-blank lines: half is 5.5, so 5 lines is too short.
        let current = program(&["a"], 4);
        assert_eq!(non_blank_lines(&current).count(), 11);
        let five = "int a(int x) { return x; }\nint main() {\n    int y = a(1);\n    return y;\n}\n";
        assert_eq!(
            check_health(&current, five, &HealthConfig::default()),
            Err(HealthViolation::TooShort { current_lines: 11, fixed_lines: 5, minimum: 6 })
        );
        let six = "int a(int x) { return x; }\nint main() {\n    int y = a(1);\n    y++;\n    return y;\n}\n";
        assert_eq!(check_health(&current, six, &HealthConfig::default()), Ok(()));
    }

    #[test]
    fn test_short_programs_skip_length_check() {
        let current = "int main() {\n  return 1;\n}\n";
        let fixed = "int main() { return 0; }\n";
        assert_eq!(check_health(current, fixed, &HealthConfig::default()), Ok(()));
    }

    #[test]
    fn test_all_helpers_removed() {
        let current = program(&["helper"], 2);
        let fixed = program(&[], 2);
        assert_eq!(
            check_health(&current, &fixed, &HealthConfig::default()),
            Err(HealthViolation::AllFunctionsRemoved { removed: vec!["helper".into()] })
        );
    }

    #[test]
    fn test_function_survival_ratio() {
        let current = program(&["a", "b", "c", "d"], 2);
        // 70% of 4 is 2.8, so half the helpers is not enough.
        let fixed = program(&["a", "b"], 10);
        assert_eq!(
            check_health(&current, &fixed, &HealthConfig::default()),
            Err(HealthViolation::TooFewFunctionsKept { kept: 2, required: 3 })
        );
        let fixed = program(&["a", "x"], 10);
        assert_eq!(
            check_health(&current, &fixed, &HealthConfig::default()),
            Err(HealthViolation::TooFewFunctionsKept { kept: 1, required: 3 })
        );
        let fixed = program(&["a", "b", "c"], 10);
        assert_eq!(check_health(&current, &fixed, &HealthConfig::default()), Ok(()));
    }
}
