//! Prompt text for the analyzer and the fixer.
//!
//! The fixer prompt doubles as the `prompt` field of mined preference pairs,
//! so training data sees exactly what inference sees.

use crate::classify::{Classification, Section};
use crate::source::add_line_numbers;

/// Used for manual pairs that ship without their own instructions.
pub const DEFAULT_INSTRUCTIONS: &str =
    "Fix all compiler, KLEE and CodeQL issues while keeping the algorithm and I/O format unchanged.";

pub fn fixer_prompt(current_code: &str, instructions: &str) -> String {
    format!(
        "You are a C code repair agent.\n\
         Fix the following code according to the repair instructions.\n\n\
         CURRENT CODE:\n{current_code}\n\n\
         REPAIR INSTRUCTIONS:\n{instructions}\n\n\
         FIXED CODE:"
    )
}

/// Prompt asking for a four-section repair instruction.
pub fn analyzer_prompt(current_code: &str, feedback: &str, classification: &Classification) -> String {
    let required: Vec<&str> = classification
        .symptoms
        .required_sections()
        .into_iter()
        .map(Section::header)
        .collect();
    let required = if required.is_empty() {
        "none beyond what the feedback needs".to_string()
    } else {
        required.join(", ")
    };

    format!(
        "You are a C static analysis assistant.\n\n\
         ERROR_TYPE:\n  {category}\n\n\
         RECOMMENDED REPAIR STRATEGY:\n{strategy}\n\n\
         Write REPAIR INSTRUCTIONS for another agent that edits the code.\n\
         Use exactly these four headers, in this order, each once:\n\
         {memory}\n{bounds}\n{signature}\n{types}\n\n\
         Under each header write either (none) or one edit per line:\n\
         - Replace \"<exact original line>\" with \"<exact new line>\"\n\
         - Remove \"<exact original line>\"\n\
         - Insert \"<new line>\" before \"<exact original line>\"\n\n\
         Rules:\n\
         - Quote original lines exactly as they appear in the code, without the line-number prefix.\n\
         - Never mention line numbers.\n\
         - No prose, no C code blocks, no markdown fences.\n\
         - {memory} is only for removing global pointers and input-sized malloc/calloc/realloc \
         with their free calls; do not use bracketed numeric sizes there.\n\
         - {signature} and {types} only change declarations: no control flow, assignments or braces.\n\
         - Sections required for this feedback: {required}.\n\n\
         CURRENT CODE (with line numbers):\n{numbered}\n\n\
         TOOL FEEDBACK:\n{feedback}\n\n\
         REPAIR INSTRUCTIONS:\n",
        category = classification.category,
        strategy = classification.strategy,
        memory = Section::MemoryModel.header(),
        bounds = Section::BoundsAccess.header(),
        signature = Section::FunctionSignature.header(),
        types = Section::Type.header(),
        numbered = add_line_numbers(current_code),
    )
}
