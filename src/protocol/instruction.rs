//! Four-section repair instruction grammar.
//!
//! ```text
//! MEMORY MODEL FIX:
//! (none)
//! BOUNDS / ACCESS FIX:
//! - Insert "if (n > MAX_N) return 1;" before "for (i = 0; i < n; i++) {"
//! FUNCTION SIGNATURE FIX:
//! (none)
//! TYPE FIX:
//! Insert "#include <stdbool.h>" before "#include <stdio.h>"
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::classify::Section;
use crate::util::static_regex;

static_regex!(fn bullet_re, r"^(?:[-*•]\s+|\d+[.)]\s+)");
static_regex!(fn replace_re, r#"(?i)^replace\s+"(.*?)"\s+with\s+"(.*)"\s*\.?$"#);
static_regex!(fn remove_re, r#"(?i)^(?:remove|delete)\s+"(.*)"\s*\.?$"#);
static_regex!(fn insert_re, r#"(?i)^insert\s+"(.*?)"\s+before\s+"(.*)"\s*\.?$"#);
static_regex!(fn quoted_re, r#""[^"]*""#);

/// One atomic, line-anchored edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Edit {
    Replace { original: String, replacement: String },
    Remove { original: String },
    Insert { text: String, before: String },
}

impl Edit {
    /// The existing program line this edit is anchored to.
    pub fn anchor(&self) -> &str {
        match self {
            Edit::Replace { original, .. } | Edit::Remove { original } => original,
            Edit::Insert { before, .. } => before,
        }
    }

    /// Text the edit introduces into the program, if any.
    pub fn new_text(&self) -> Option<&str> {
        match self {
            Edit::Replace { replacement, .. } => Some(replacement),
            Edit::Insert { text, .. } => Some(text),
            Edit::Remove { .. } => None,
        }
    }

    /// Whether the anchor line is removed or rewritten (as opposed to kept).
    pub fn rewrites_anchor(&self) -> bool {
        matches!(self, Edit::Replace { .. } | Edit::Remove { .. })
    }

    /// Parse a single edit line; bullets are tolerated.
    pub fn parse(line: &str) -> Result<Edit, String> {
        let body = strip_bullet(line.trim());
        if let Some(caps) = replace_re().captures(body) {
            let original = caps[1].to_string();
            let replacement = caps[2].to_string();
            if original.trim().is_empty() {
                return Err("Replace needs a non-empty original line".into());
            }
            if replacement.trim().is_empty() {
                return Err("Replace produces an empty line; use Remove".into());
            }
            return Ok(Edit::Replace { original, replacement });
        }
        if let Some(caps) = insert_re().captures(body) {
            let text = caps[1].to_string();
            let before = caps[2].to_string();
            if before.trim().is_empty() {
                return Err("Insert needs a non-empty anchor line".into());
            }
            if text.trim().is_empty() {
                return Err("Insert needs non-empty new text".into());
            }
            return Ok(Edit::Insert { text, before });
        }
        if let Some(caps) = remove_re().captures(body) {
            let original = caps[1].to_string();
            if original.trim().is_empty() {
                return Err("Remove needs a non-empty original line".into());
            }
            return Ok(Edit::Remove { original });
        }
        Err(format!(
            "expected Replace \"..\" with \"..\", Remove \"..\" or Insert \"..\" before \"..\", got: {}",
            crate::util::truncate(body, 80)
        ))
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::Replace { original, replacement } => {
                write!(f, "Replace \"{original}\" with \"{replacement}\"")
            }
            Edit::Remove { original } => write!(f, "Remove \"{original}\""),
            Edit::Insert { text, before } => write!(f, "Insert \"{text}\" before \"{before}\""),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionBody {
    #[default]
    None,
    Edits(Vec<Edit>),
}

impl SectionBody {
    pub fn is_none(&self) -> bool {
        matches!(self, SectionBody::None)
    }

    pub fn edits(&self) -> &[Edit] {
        match self {
            SectionBody::None => &[],
            SectionBody::Edits(edits) => edits,
        }
    }

    fn push(&mut self, mut moved: Vec<Edit>) {
        match self {
            SectionBody::None => {
                if !moved.is_empty() {
                    *self = SectionBody::Edits(moved);
                }
            }
            SectionBody::Edits(edits) => edits.append(&mut moved),
        }
    }

    /// Parse the lines under one header.
    pub fn parse(lines: &[String]) -> Result<SectionBody, String> {
        let content: Vec<&str> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect();
        if content.is_empty() {
            return Ok(SectionBody::None);
        }
        let none_marker = |line: &str| strip_bullet(line).eq_ignore_ascii_case("(none)");
        if content.iter().all(|line| none_marker(*line)) {
            return Ok(SectionBody::None);
        }
        if content.iter().any(|line| none_marker(*line)) {
            return Err("section mixes (none) with edits".into());
        }
        let edits = content
            .iter()
            .map(|line| Edit::parse(*line))
            .collect::<Result<Vec<_>, _>>()?;
        if edits.is_empty() {
            return Err("section has content but no edits".into());
        }
        Ok(SectionBody::Edits(edits))
    }
}

/// Raw text of each section, split at the four headers.
#[derive(Debug, Clone, Default)]
pub struct SectionTexts {
    pub bodies: BTreeMap<Section, Vec<String>>,
    pub missing: Vec<Section>,
    pub duplicated: Vec<Section>,
}

impl SectionTexts {
    pub fn split(text: &str) -> SectionTexts {
        let mut out = SectionTexts::default();
        let mut seen: BTreeMap<Section, usize> = BTreeMap::new();
        let mut current: Option<Section> = None;

        for line in text.lines() {
            let trimmed = strip_header_decoration(line);
            let header = Section::ALL
                .into_iter()
                .find(|section| trimmed.starts_with(section.header()));
            if let Some(section) = header {
                *seen.entry(section).or_default() += 1;
                current = Some(section);
                let rest = trimmed[section.header().len()..].trim();
                let body = out.bodies.entry(section).or_default();
                if !rest.is_empty() {
                    body.push(rest.to_string());
                }
                continue;
            }
            if let Some(section) = current {
                out.bodies.entry(section).or_default().push(line.to_string());
            }
        }

        for section in Section::ALL {
            match seen.get(&section).copied().unwrap_or(0) {
                0 => out.missing.push(section),
                1 => {}
                _ => out.duplicated.push(section),
            }
        }
        out
    }

    pub fn lines(&self, section: Section) -> &[String] {
        self.bodies.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A parsed instruction: one body per section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairInstruction {
    pub memory_model: SectionBody,
    pub bounds_access: SectionBody,
    pub function_signature: SectionBody,
    pub type_fix: SectionBody,
}

impl RepairInstruction {
    pub fn section(&self, section: Section) -> &SectionBody {
        match section {
            Section::MemoryModel => &self.memory_model,
            Section::BoundsAccess => &self.bounds_access,
            Section::FunctionSignature => &self.function_signature,
            Section::Type => &self.type_fix,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut SectionBody {
        match section {
            Section::MemoryModel => &mut self.memory_model,
            Section::BoundsAccess => &mut self.bounds_access,
            Section::FunctionSignature => &mut self.function_signature,
            Section::Type => &mut self.type_fix,
        }
    }

    /// Move every edit of `from` to the end of `to`, leaving `from` empty.
    /// Returns how many edits moved.
    pub fn move_edits(&mut self, from: Section, to: Section) -> usize {
        let moved = match std::mem::take(self.section_mut(from)) {
            SectionBody::None => Vec::new(),
            SectionBody::Edits(edits) => edits,
        };
        let count = moved.len();
        self.section_mut(to).push(moved);
        count
    }

    pub fn edits(&self) -> impl Iterator<Item = (Section, &Edit)> + '_ {
        Section::ALL
            .into_iter()
            .flat_map(move |section| self.section(section).edits().iter().map(move |e| (section, e)))
    }

    /// Strict parse: every header exactly once and every body well formed.
    pub fn parse(text: &str) -> Result<RepairInstruction, String> {
        let texts = SectionTexts::split(text);
        if let Some(section) = texts.missing.first() {
            return Err(format!("missing section {}", section.header()));
        }
        if let Some(section) = texts.duplicated.first() {
            return Err(format!("section {} appears more than once", section.header()));
        }
        Self::from_sections(&texts).map_err(|(section, reason)| format!("{section}: {reason}"))
    }

    /// Lenient parse for degraded drafts: absent or unparseable sections
    /// count as `(none)`, unparseable lines are dropped.
    pub fn parse_lenient(text: &str) -> RepairInstruction {
        let texts = SectionTexts::split(text);
        let mut instruction = RepairInstruction::default();
        for section in Section::ALL {
            let edits: Vec<Edit> = texts
                .lines(section)
                .iter()
                .filter_map(|line| Edit::parse(line).ok())
                .collect();
            if !edits.is_empty() {
                *instruction.section_mut(section) = SectionBody::Edits(edits);
            }
        }
        instruction
    }

    pub(crate) fn from_sections(
        texts: &SectionTexts,
    ) -> Result<RepairInstruction, (Section, String)> {
        let mut instruction = RepairInstruction::default();
        for section in Section::ALL {
            let body = SectionBody::parse(texts.lines(section)).map_err(|reason| (section, reason))?;
            *instruction.section_mut(section) = body;
        }
        Ok(instruction)
    }
}

impl fmt::Display for RepairInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, section) in Section::ALL.into_iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", section.header())?;
            match self.section(section) {
                SectionBody::None => writeln!(f, "(none)")?,
                SectionBody::Edits(edits) => {
                    for edit in edits {
                        writeln!(f, "- {edit}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn strip_bullet(line: &str) -> &str {
    match bullet_re().find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

fn strip_header_decoration(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim_start_matches("**").trim().trim_end_matches("**")
}

/// The parts of a line that are not quoted code.
pub(crate) fn unquoted(line: &str) -> String {
    let body = strip_bullet(line.trim());
    if let Some(caps) = replace_re().captures(body) {
        return cut_groups(body, &caps);
    }
    if let Some(caps) = insert_re().captures(body) {
        return cut_groups(body, &caps);
    }
    if let Some(caps) = remove_re().captures(body) {
        return cut_groups(body, &caps);
    }
    quoted_re().replace_all(body, " ").into_owned()
}

fn cut_groups(body: &str, caps: &regex::Captures<'_>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for group in caps.iter().skip(1).flatten() {
        out.push_str(&body[cursor..group.start()]);
        cursor = group.end();
    }
    out.push_str(&body[cursor..]);
    out
}
