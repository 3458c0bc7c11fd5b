//! Ordered validation rules for repair instructions.

use serde::Serialize;

use super::instruction::{unquoted, Edit, RepairInstruction, SectionTexts};
use crate::classify::{ErrorCategory, Section, SymptomSummary};
use crate::source::{contains_line, non_blank_lines, normalize_line, MemoryFacts};
use crate::util::static_regex;

static_regex!(fn numbered_line_re, r"^\s*\d+\s*:");
static_regex!(fn line_reference_re, r"(?i)\blines?\s+\d+");
static_regex!(fn bracketed_literal_re, r"\[\s*\d+\s*\]");

/// Why a draft was rejected. The first failing rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("instruction is empty")]
    Empty,
    #[error("missing section header '{}'", .section.header())]
    MissingSection { section: Section },
    #[error("section header '{}' appears more than once", .section.header())]
    DuplicateSection { section: Section },
    #[error("MEMORY MODEL FIX uses a bracketed numeric literal: {literal}")]
    BracketedLiteralInMemoryFix { literal: String },
    #[error("instruction references line numbers: {line}")]
    LineNumberReference { line: String },
    #[error("instruction uses the vague phrase '{phrase}'")]
    ForbiddenPhrase { phrase: String },
    #[error("{section}: {reason}")]
    MalformedEdit { section: Section, reason: String },
    #[error("{section}: quoted line not found in program: {line}")]
    UnknownAnchorLine { section: Section, line: String },
    #[error("MEMORY MODEL FIX is required for this program but is (none)")]
    MemoryFixMissing,
    #[error("MEMORY MODEL FIX does not remove or rewrite: {}", .missing.join(" | "))]
    MemoryFixIncomplete { missing: Vec<String> },
    #[error("MEMORY MODEL FIX must be (none): program has no global pointer or allocation")]
    MemoryFixForbidden,
    #[error("{section} is required by the reported symptoms but is (none)")]
    RequiredSectionEmpty { section: Section },
    #[error("{section} is not permitted for {category} feedback")]
    SectionNotPermitted { section: Section, category: ErrorCategory },
}

/// Everything the rules need besides the draft itself.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub program: &'a str,
    pub category: ErrorCategory,
    pub symptoms: &'a SymptomSummary,
    pub forbidden_phrases: &'a [String],
}

/// An edit moved out of a section that was not permitted to hold it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub from: Section,
    pub to: Section,
    pub edits_moved: usize,
}

/// A draft that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidRepairInstruction {
    pub instruction: RepairInstruction,
    pub corrections: Vec<Correction>,
}

impl ValidRepairInstruction {
    /// Canonical text form, as handed to the fixer and persisted.
    pub fn render(&self) -> String {
        self.instruction.to_string()
    }
}

pub fn validate(
    text: &str,
    ctx: &ValidationContext<'_>,
) -> Result<ValidRepairInstruction, RejectionReason> {
    check_not_empty(text)?;

    let texts = SectionTexts::split(text);
    if let Some(&section) = texts.missing.first() {
        return Err(RejectionReason::MissingSection { section });
    }
    if let Some(&section) = texts.duplicated.first() {
        return Err(RejectionReason::DuplicateSection { section });
    }

    check_bracketed_literals(&texts)?;
    check_line_references(text)?;
    check_forbidden_phrases(text, ctx.forbidden_phrases)?;

    let mut instruction = RepairInstruction::from_sections(&texts)
        .map_err(|(section, reason)| RejectionReason::MalformedEdit { section, reason })?;

    check_anchors(&instruction, ctx.program)?;
    check_memory_model(&instruction, ctx)?;
    check_required_sections(&instruction, ctx.symptoms)?;
    let corrections = enforce_section_scope(&mut instruction, ctx)?;

    Ok(ValidRepairInstruction {
        instruction,
        corrections,
    })
}

fn check_not_empty(text: &str) -> Result<(), RejectionReason> {
    let only_separators = text
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, '-' | '=' | '_' | '*' | '#' | '~'));
    if only_separators {
        Err(RejectionReason::Empty)
    } else {
        Ok(())
    }
}

fn check_bracketed_literals(texts: &SectionTexts) -> Result<(), RejectionReason> {
    for line in texts.lines(Section::MemoryModel) {
        if let Some(m) = bracketed_literal_re().find(line) {
            return Err(RejectionReason::BracketedLiteralInMemoryFix {
                literal: m.as_str().to_string(),
            });
        }
    }
    Ok(())
}

fn check_line_references(text: &str) -> Result<(), RejectionReason> {
    for line in text.lines() {
        if numbered_line_re().is_match(line) || line_reference_re().is_match(&unquoted(line)) {
            return Err(RejectionReason::LineNumberReference {
                line: crate::util::truncate(line.trim(), 120),
            });
        }
    }
    Ok(())
}

fn check_forbidden_phrases(text: &str, phrases: &[String]) -> Result<(), RejectionReason> {
    for line in text.lines() {
        let outside = unquoted(line).to_lowercase();
        if let Some(phrase) = phrases
            .iter()
            .find(|phrase| !phrase.is_empty() && outside.contains(&phrase.to_lowercase()))
        {
            return Err(RejectionReason::ForbiddenPhrase {
                phrase: phrase.trim().to_string(),
            });
        }
    }
    Ok(())
}

fn check_anchors(instruction: &RepairInstruction, program: &str) -> Result<(), RejectionReason> {
    for (section, edit) in instruction.edits() {
        if !contains_line(program, edit.anchor()) {
            return Err(RejectionReason::UnknownAnchorLine {
                section,
                line: edit.anchor().to_string(),
            });
        }
    }
    Ok(())
}

fn check_memory_model(
    instruction: &RepairInstruction,
    ctx: &ValidationContext<'_>,
) -> Result<(), RejectionReason> {
    let facts = MemoryFacts::scan(ctx.program);
    let body = &instruction.memory_model;

    if ctx.symptoms.requires(Section::MemoryModel) && facts.needs_memory_fix() {
        if body.is_none() {
            return Err(RejectionReason::MemoryFixMissing);
        }
        let missing: Vec<String> = facts
            .lines_requiring_rewrite()
            .into_iter()
            .filter(|line| !body.edits().iter().any(|edit| covers(edit, line)))
            .collect();
        if !missing.is_empty() {
            return Err(RejectionReason::MemoryFixIncomplete { missing });
        }
        return Ok(());
    }

    if facts.forbids_memory_fix() && !body.is_none() {
        return Err(RejectionReason::MemoryFixForbidden);
    }
    Ok(())
}

/// Whether `edit` removes or rewrites the (normalized) program line. The
/// anchor must quote that whole line; a multi-line anchor covers each of its
/// lines.
fn covers(edit: &Edit, line: &str) -> bool {
    edit.rewrites_anchor()
        && non_blank_lines(edit.anchor()).any(|anchor| normalize_line(anchor) == line)
}

fn check_required_sections(
    instruction: &RepairInstruction,
    symptoms: &SymptomSummary,
) -> Result<(), RejectionReason> {
    for section in [Section::BoundsAccess, Section::FunctionSignature, Section::Type] {
        if symptoms.requires(section) && instruction.section(section).is_none() {
            return Err(RejectionReason::RequiredSectionEmpty { section });
        }
    }
    Ok(())
}

fn enforce_section_scope(
    instruction: &mut RepairInstruction,
    ctx: &ValidationContext<'_>,
) -> Result<Vec<Correction>, RejectionReason> {
    let mut corrections = Vec::new();
    for section in [Section::FunctionSignature, Section::Type] {
        if ctx.symptoms.requires(section) || instruction.section(section).is_none() {
            continue;
        }
        if ctx.category != ErrorCategory::General {
            return Err(RejectionReason::SectionNotPermitted {
                section,
                category: ctx.category,
            });
        }
        let edits_moved = instruction.move_edits(section, Section::BoundsAccess);
        corrections.push(Correction {
            from: section,
            to: Section::BoundsAccess,
            edits_moved,
        });
    }
    Ok(corrections)
}
