//! Feedback classification.
//!
//! Routes raw compiler / KLEE / CodeQL text to exactly one [`ErrorCategory`]
//! with a strategy hint for the analyzer, and independently collects every
//! symptom present so the instruction contract knows which sections must be
//! filled in.

mod rules;
mod symptoms;

pub use symptoms::{Section, Symptom, SymptomSummary};

use std::fmt;

use serde::{Deserialize, Serialize};

use rules::{Feedback, RULES};

/// Closed routing taxonomy, listed in match priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    VoidAssign,
    CalledObjectNotFunction,
    LinePrefix,
    BoolPortability,
    ImplicitDeclaration,
    VlaStatic,
    InvalidFree,
    SymbolicMalloc,
    BoundsOrDivision,
    ArityMismatch,
    TypeMismatch,
    General,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::VoidAssign => "VOID_ASSIGN",
            ErrorCategory::CalledObjectNotFunction => "CALLED_OBJECT_NOT_FUNCTION",
            ErrorCategory::LinePrefix => "LINE_PREFIX",
            ErrorCategory::BoolPortability => "BOOL_PORTABILITY",
            ErrorCategory::ImplicitDeclaration => "IMPLICIT_DECLARATION",
            ErrorCategory::VlaStatic => "VLA_STATIC",
            ErrorCategory::InvalidFree => "INVALID_FREE",
            ErrorCategory::SymbolicMalloc => "SYMBOLIC_MALLOC",
            ErrorCategory::BoundsOrDivision => "BOUNDS_OR_DIVISION",
            ErrorCategory::ArityMismatch => "ARITY_MISMATCH",
            ErrorCategory::TypeMismatch => "TYPE_MISMATCH",
            ErrorCategory::General => "GENERAL",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub strategy: String,
    pub symptoms: SymptomSummary,
}

/// Classify one feedback text. Total: unmatched or empty input is `General`.
pub fn classify(feedback: &str) -> Classification {
    let fb = Feedback::new(feedback);
    let category = RULES
        .iter()
        .find(|rule| (rule.matches)(&fb))
        .map(|rule| rule.category)
        .unwrap_or(ErrorCategory::General);

    Classification {
        category,
        strategy: rules::strategy_for(category, feedback),
        symptoms: SymptomSummary::detect(&fb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_feedback_is_general() {
        let c = classify("");
        assert_eq!(c.category, ErrorCategory::General);
        assert!(!c.strategy.is_empty());
        assert!(c.symptoms.is_empty());
    }

    #[test]
    fn test_void_assign_beats_later_rules() {
        let fb = "code_3.c:10:7: error: assigning to 'int' from incompatible type 'void'\n\
                  code_3.c:12:3: error: too few arguments to function call";
        let c = classify(fb);
        assert_eq!(c.category, ErrorCategory::VoidAssign);
        assert!(c.symptoms.contains(Symptom::VoidAssignment));
        assert!(c.symptoms.contains(Symptom::ArityMismatch));
        assert!(c.symptoms.requires(Section::Type));
        assert!(c.symptoms.requires(Section::FunctionSignature));
    }

    #[test]
    fn test_implicit_declaration_names_function() {
        let fb = "code_1.c:5:12: warning: implicit declaration of function 'mirror' is invalid in C99";
        let c = classify(fb);
        assert_eq!(c.category, ErrorCategory::ImplicitDeclaration);
        assert!(c.strategy.contains("implicit declaration of mirror"));
    }

    #[test]
    fn test_line_prefix_from_echoed_listing() {
        let fb = "code_2.c:1:1: error: unknown type name '1'\n1: #include <stdio.h>";
        assert_eq!(classify(fb).category, ErrorCategory::LinePrefix);
    }

    #[test]
    fn test_klee_symbolic_malloc_requires_memory_section() {
        let fb = "KLEE: WARNING: concretized symbolic size\nKLEE: ERROR: memory error: out of bound pointer";
        let c = classify(fb);
        assert_eq!(c.category, ErrorCategory::SymbolicMalloc);
        assert!(c.symptoms.requires(Section::MemoryModel));
        assert!(c.symptoms.requires(Section::BoundsAccess));
        assert!(!c.symptoms.requires(Section::Type));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            classify("KLEE: ERROR: DIVISION BY ZERO").category,
            ErrorCategory::BoundsOrDivision
        );
        assert_eq!(
            classify("error: Conflicting Types for 'f'").category,
            ErrorCategory::TypeMismatch
        );
    }

    #[test]
    fn test_unrecognized_text_is_general() {
        let c = classify("Segment 3 finished with exit code 0");
        assert_eq!(c.category, ErrorCategory::General);
        assert_eq!(c.strategy, rules::GENERAL_STRATEGY);
    }

    proptest! {
        #[test]
        fn prop_classify_is_total(text in ".{0,400}") {
            let c = classify(&text);
            prop_assert!(!c.strategy.is_empty());
            if c.category == ErrorCategory::General {
                prop_assert!(RULES.iter().all(|rule| !(rule.matches)(&Feedback::new(&text))));
            }
        }

        #[test]
        fn prop_classify_is_deterministic(text in "[a-zA-Z ':0-9\n]{0,200}") {
            prop_assert_eq!(classify(&text), classify(&text));
        }
    }
}
