use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::rules::{self, Feedback, Predicate};

/// The four sections of a repair instruction, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    MemoryModel,
    BoundsAccess,
    FunctionSignature,
    Type,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::MemoryModel,
        Section::BoundsAccess,
        Section::FunctionSignature,
        Section::Type,
    ];

    /// Header line exactly as it must appear in an instruction.
    pub fn header(self) -> &'static str {
        match self {
            Section::MemoryModel => "MEMORY MODEL FIX:",
            Section::BoundsAccess => "BOUNDS / ACCESS FIX:",
            Section::FunctionSignature => "FUNCTION SIGNATURE FIX:",
            Section::Type => "TYPE FIX:",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header().trim_end_matches(':'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    SymbolicAllocation,
    InvalidFree,
    OutOfBounds,
    NullDereference,
    DivisionByZero,
    VlaMisuse,
    ShadowedFunction,
    LinePrefix,
    ImplicitDeclaration,
    ArityMismatch,
    VoidAssignment,
    BoolUndeclared,
    TypeMismatch,
}

impl Symptom {
    pub fn required_section(self) -> Section {
        match self {
            Symptom::SymbolicAllocation | Symptom::InvalidFree => Section::MemoryModel,
            Symptom::OutOfBounds
            | Symptom::NullDereference
            | Symptom::DivisionByZero
            | Symptom::VlaMisuse
            | Symptom::ShadowedFunction
            | Symptom::LinePrefix => Section::BoundsAccess,
            Symptom::ImplicitDeclaration | Symptom::ArityMismatch => Section::FunctionSignature,
            Symptom::VoidAssignment | Symptom::BoolUndeclared | Symptom::TypeMismatch => {
                Section::Type
            }
        }
    }
}

const DETECTORS: &[(Symptom, Predicate)] = &[
    (Symptom::SymbolicAllocation, rules::symbolic_allocation),
    (Symptom::InvalidFree, rules::invalid_free),
    (Symptom::OutOfBounds, rules::out_of_bounds),
    (Symptom::NullDereference, rules::null_dereference),
    (Symptom::DivisionByZero, rules::division_by_zero),
    (Symptom::VlaMisuse, rules::vla_misuse),
    (Symptom::ShadowedFunction, rules::called_object),
    (Symptom::LinePrefix, rules::line_prefix),
    (Symptom::ImplicitDeclaration, rules::implicit_declaration),
    (Symptom::ArityMismatch, rules::arity_mismatch),
    (Symptom::VoidAssignment, rules::void_assign),
    (Symptom::BoolUndeclared, rules::bool_undeclared),
    (Symptom::TypeMismatch, rules::type_mismatch),
];

/// Every symptom present in one feedback text, regardless of routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomSummary {
    symptoms: BTreeSet<Symptom>,
}

impl SymptomSummary {
    pub(crate) fn detect(fb: &Feedback<'_>) -> Self {
        let symptoms = DETECTORS
            .iter()
            .filter(|(_, detect)| detect(fb))
            .map(|(symptom, _)| *symptom)
            .collect();
        Self { symptoms }
    }

    pub fn contains(&self, symptom: Symptom) -> bool {
        self.symptoms.contains(&symptom)
    }

    pub fn iter(&self) -> impl Iterator<Item = Symptom> + '_ {
        self.symptoms.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }

    pub fn requires(&self, section: Section) -> bool {
        self.symptoms.iter().any(|s| s.required_section() == section)
    }

    pub fn required_sections(&self) -> BTreeSet<Section> {
        self.symptoms.iter().map(|s| s.required_section()).collect()
    }
}

impl FromIterator<Symptom> for SymptomSummary {
    fn from_iter<I: IntoIterator<Item = Symptom>>(iter: I) -> Self {
        Self {
            symptoms: iter.into_iter().collect(),
        }
    }
}
