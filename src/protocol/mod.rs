//! The structured repair-instruction contract.
//!
//! Drafts are parsed into a typed [`RepairInstruction`] and run through an
//! ordered rule set. [`ProtocolSession`] wraps that in a bounded re-prompt
//! loop that never blocks the pipeline: after the last attempt the final
//! draft goes through as degraded.

mod instruction;
mod rules;
mod session;

pub use instruction::{Edit, RepairInstruction, SectionBody, SectionTexts};
pub use rules::{validate, Correction, RejectionReason, ValidRepairInstruction, ValidationContext};
pub use session::{DraftRecord, ProtocolSession, SessionOutcome, SessionState};
