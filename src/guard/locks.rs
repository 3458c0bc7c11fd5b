//! Token locks on signature and type edits.
//!
//! Those two sections may only change declarations. New text carrying
//! control flow, assignment or a block means the drafting stage let a logic
//! change through under a structural heading.

use crate::classify::Section;
use crate::error::RepairError;
use crate::protocol::RepairInstruction;
use crate::util::static_regex;

static_regex!(
    fn control_keyword_re,
    r"\b(if|else|for|while|do|switch|case|return|goto|break|continue)\b"
);

const LOCKED_SECTIONS: [Section; 2] = [Section::FunctionSignature, Section::Type];

/// First forbidden token in `text`, if any.
pub fn forbidden_token(text: &str) -> Option<String> {
    if let Some(m) = control_keyword_re().find(text) {
        return Some(format!("control-flow keyword '{}'", m.as_str()));
    }
    if let Some(brace) = text.chars().find(|c| matches!(c, '{' | '}')) {
        return Some(format!("brace '{brace}'"));
    }
    if has_assignment(text) {
        return Some("assignment '='".to_string());
    }
    None
}

/// `=` that is not part of `==`, `!=`, `<=` or `>=`.
fn has_assignment(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars.iter().enumerate().any(|(idx, &c)| {
        if c != '=' {
            return false;
        }
        let prev = idx.checked_sub(1).map(|i| chars[i]);
        let next = chars.get(idx + 1).copied();
        let comparison_tail = matches!(prev, Some('=' | '!' | '<' | '>'));
        let comparison_head = next == Some('=');
        !comparison_tail && !comparison_head
    })
}

/// Reject an instruction whose locked sections introduce forbidden tokens.
pub fn preflight(instruction: &RepairInstruction) -> Result<(), RepairError> {
    for section in LOCKED_SECTIONS {
        for edit in instruction.section(section).edits() {
            let Some(text) = edit.new_text() else {
                continue;
            };
            if let Some(token) = forbidden_token(text) {
                return Err(RepairError::ContractBreach {
                    reason: format!("{section} introduces {token}: {text}"),
                });
            }
        }
    }
    Ok(())
}
