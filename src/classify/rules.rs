//! Trigger predicates and strategy text for each category.

use super::ErrorCategory;
use crate::util::static_regex;

static_regex!(fn numeric_type_name_re, r"unknown type name '\d+'");
static_regex!(fn prefixed_include_re, r"(?m)^\s*\d+:\s*#include");
static_regex!(fn prefixed_source_re, r"(?m)(?:^|\|)\s*\d+:\s");
static_regex!(fn implicit_fn_re, r"implicit declaration of function '([^']+)'");

/// Feedback text prepared once for all predicates.
pub(crate) struct Feedback<'a> {
    pub raw: &'a str,
    pub lower: String,
}

impl<'a> Feedback<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.to_lowercase(),
        }
    }

    fn has(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.lower.contains(needle))
    }
}

pub(crate) type Predicate = fn(&Feedback<'_>) -> bool;

pub(crate) struct Rule {
    pub category: ErrorCategory,
    pub matches: Predicate,
}

/// Routing table. Order is priority: the first match wins.
pub(crate) const RULES: &[Rule] = &[
    Rule { category: ErrorCategory::VoidAssign, matches: void_assign },
    Rule { category: ErrorCategory::CalledObjectNotFunction, matches: called_object },
    Rule { category: ErrorCategory::LinePrefix, matches: line_prefix },
    Rule { category: ErrorCategory::BoolPortability, matches: bool_undeclared },
    Rule { category: ErrorCategory::ImplicitDeclaration, matches: implicit_declaration },
    Rule { category: ErrorCategory::VlaStatic, matches: vla_misuse },
    Rule { category: ErrorCategory::InvalidFree, matches: invalid_free },
    Rule { category: ErrorCategory::SymbolicMalloc, matches: symbolic_allocation },
    Rule { category: ErrorCategory::BoundsOrDivision, matches: bounds_or_division },
    Rule { category: ErrorCategory::ArityMismatch, matches: arity_mismatch },
    Rule { category: ErrorCategory::TypeMismatch, matches: type_mismatch },
];

pub(crate) fn void_assign(fb: &Feedback<'_>) -> bool {
    (fb.has("assigning to '") && fb.has("incompatible type 'void'"))
        || fb.has("void value not ignored")
}

pub(crate) fn called_object(fb: &Feedback<'_>) -> bool {
    (fb.has("called object type") && fb.has("is not a function or function pointer"))
        || fb.has("called object is not a function")
}

pub(crate) fn line_prefix(fb: &Feedback<'_>) -> bool {
    numeric_type_name_re().is_match(&fb.lower)
        || prefixed_include_re().is_match(fb.raw)
        || (fb.has("expected identifier or '('") && prefixed_source_re().is_match(fb.raw))
}

pub(crate) fn bool_undeclared(fb: &Feedback<'_>) -> bool {
    fb.has_any(&[
        "use of undeclared identifier 'bool'",
        "use of undeclared identifier 'true'",
        "use of undeclared identifier 'false'",
        "unknown type name 'bool'",
        "'bool' undeclared",
        "'true' undeclared",
        "'false' undeclared",
    ])
}

pub(crate) fn implicit_declaration(fb: &Feedback<'_>) -> bool {
    fb.has("implicit declaration of function")
}

pub(crate) fn vla_misuse(fb: &Feedback<'_>) -> bool {
    (fb.has("variable length array") && fb.has("static"))
        || fb.has("variable-sized object may not be initialized")
}

pub(crate) fn invalid_free(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["invalid free", "free of address", "double free"])
}

pub(crate) fn symbolic_allocation(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["symbolic-sized malloc", "concretized symbolic size", "symbolic size"])
}

pub(crate) fn out_of_bounds(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["out of bound", "out-of-bounds"])
}

pub(crate) fn null_dereference(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["null page access", "null pointer"])
}

pub(crate) fn division_by_zero(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["division by zero", "div by zero", "divide by zero"])
}

fn bounds_or_division(fb: &Feedback<'_>) -> bool {
    out_of_bounds(fb) || null_dereference(fb) || division_by_zero(fb)
}

pub(crate) fn arity_mismatch(fb: &Feedback<'_>) -> bool {
    fb.has_any(&["too few arguments", "too many arguments"])
}

pub(crate) fn type_mismatch(fb: &Feedback<'_>) -> bool {
    fb.has_any(&[
        "incompatible pointer types",
        "incompatible integer to pointer",
        "incompatible pointer to integer",
        "conflicting types for",
        "invalid operands to binary expression",
    ])
}

/// Name of the first implicitly declared function, if the compiler gave one.
pub(crate) fn implicit_function_name(raw: &str) -> Option<&str> {
    implicit_fn_re()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn strategy_for(category: ErrorCategory, raw: &str) -> String {
    match category {
        ErrorCategory::ImplicitDeclaration => {
            let name = implicit_function_name(raw).unwrap_or("the function");
            format!(
                "- The compiler reports an implicit declaration of {name}.\n\
                 - {name} is called before it is declared or defined.\n\n\
                 You MUST:\n\
                 - Either move the full definition of {name} above main and above its first call,\n\
                 - OR add a prototype for {name} before main that matches its definition.\n\n\
                 Do NOT rename {name} or change its parameter list."
            )
        }
        other => STATIC_STRATEGIES
            .iter()
            .find(|(category, _)| *category == other)
            .map(|(_, text)| (*text).to_string())
            .unwrap_or_else(|| GENERAL_STRATEGY.to_string()),
    }
}

pub(crate) const GENERAL_STRATEGY: &str = "\
- The error does not match a specific category.
You should still propose concrete, local fixes:
- Adjust conditions, loop bounds, or missing base cases.
- Add simple guards for bad inputs.
Avoid large refactors or changing the overall algorithm.";

const STATIC_STRATEGIES: &[(ErrorCategory, &str)] = &[
    (
        ErrorCategory::VoidAssign,
        "\
- The compiler reports an assignment from a value of type 'void'.
- A function declared 'void' is being used on the right-hand side of an assignment.

You MUST:
- Rewrite every line of the shape `x = void_fn(...);` to `void_fn(...);`.
- Treat the void function as a procedure that mutates its arguments in place.
- Do NOT change the function's return type to make the assignment compile.
- Do NOT introduce malloc/free in this fix.",
    ),
    (
        ErrorCategory::CalledObjectNotFunction,
        "\
- The compiler reports that a called object is not a function.
- A local variable almost certainly shadows a function name, e.g.
    int total = total(arr, n);

You MUST:
- Rename the variable (e.g. 'result') and keep the function name unchanged.
- Do NOT delete the function definition.
- Do NOT change the function signature.",
    ),
    (
        ErrorCategory::LinePrefix,
        "\
- The compiler sees tokens like \"2:\" in front of #include or code lines.
- These are line-number prefixes written into the source by mistake.

You MUST:
- Remove numeric prefixes such as \"2: \" or \"15: \" from the affected lines.
Example:
- Replace \"2: #include <stdio.h>\" with \"#include <stdio.h>\".
Do not change the include list or the control flow.",
    ),
    (
        ErrorCategory::BoolPortability,
        "\
- The compiler reports 'bool', 'true' or 'false' as undeclared.
- Portable C needs <stdbool.h> or plain int / 0 / 1.

You MUST pick one strategy and apply it consistently:
- EITHER add '#include <stdbool.h>' next to the other includes,
- OR replace 'bool' with 'int' and 'true'/'false' with 1/0.

Do NOT change the algorithm or the I/O format.",
    ),
    (
        ErrorCategory::VlaStatic,
        "\
- The compiler reports a variable length array with static storage, or an initialized VLA.

You MUST:
- Either remove 'static' from the VLA declaration,
- OR introduce a compile-time bound (e.g. '#define MAX_N 100'), declare 'int a[MAX_N];'
  and reject inputs with 'n > MAX_N'.

Do NOT keep any 'static T a[n];' where n is not a compile-time constant.",
    ),
    (
        ErrorCategory::InvalidFree,
        "\
- KLEE reports an invalid free or a double free.

You MUST:
- Free each dynamically allocated region exactly once.
- Do NOT free pointers that alias arrays or memory still used by the caller.
- If a function returns a caller-owned buffer, do not free it inside that function.",
    ),
    (
        ErrorCategory::SymbolicMalloc,
        "\
- KLEE reports an allocation whose size depends on symbolic input.

You MUST:
- Introduce a compile-time upper bound constant (e.g. MAX_N).
- Replace input-sized malloc/arrays with fixed-size arrays of that bound.
- Add an input range guard so the runtime size never exceeds MAX_N.
Do NOT invent arbitrary numeric constants; keep MAX_N small but reasonable.",
    ),
    (
        ErrorCategory::BoundsOrDivision,
        "\
- The tool reports an out-of-bounds access, a null dereference, or a division by zero.

You MUST add explicit guards around the failing operation:
  * Array access: ensure '0 <= index && index < size'.
  * Pointer dereference: ensure 'ptr != NULL' first.
  * Division or modulo: ensure the divisor is non-zero.",
    ),
    (
        ErrorCategory::ArityMismatch,
        "\
- The compiler reports a call with too few or too many arguments.

You MUST:
- Make the call sites and the function prototype/definition agree on the parameter list.
- Prefer fixing the prototype to match the definition.
- Do NOT delete the function or change what it computes.",
    ),
    (
        ErrorCategory::TypeMismatch,
        "\
- The compiler reports incompatible or conflicting types.

You MUST:
- Make declarations, prototypes and uses agree on one type.
- Fix the declared type rather than adding casts that hide the mismatch.
- Do NOT change control flow in this fix.",
    ),
];
