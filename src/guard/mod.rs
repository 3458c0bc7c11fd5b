//! Post-generation safety checks for applied repairs.
//!
//! Every rejection returns the original program. The guard fails safe to the
//! prior version, never to an empty file.

mod locks;

pub use locks::{forbidden_token, preflight};

use serde::Serialize;

use crate::config::GuardConfig;
use crate::error::RepairError;
use crate::model::RepairModel;
use crate::protocol::RepairInstruction;
use crate::source::{extract_c_code, line_count, non_main_function_names, normalize_whitespace};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Accepted {
        code: String,
        /// Set when the size shift is notable but under the reject ratio.
        warning: Option<String>,
    },
    Rejected {
        /// Always the original program.
        code: String,
        #[serde(serialize_with = "serialize_error")]
        error: RepairError,
    },
}

fn serialize_error<S: serde::Serializer>(err: &RepairError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}

impl GuardDecision {
    pub fn code(&self) -> &str {
        match self {
            GuardDecision::Accepted { code, .. } | GuardDecision::Rejected { code, .. } => code,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, GuardDecision::Accepted { .. })
    }

    pub fn error(&self) -> Option<&RepairError> {
        match self {
            GuardDecision::Accepted { .. } => None,
            GuardDecision::Rejected { error, .. } => Some(error),
        }
    }

    fn reject(original: &str, error: RepairError) -> Self {
        GuardDecision::Rejected {
            code: original.to_string(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardOutcome {
    pub decision: GuardDecision,
    /// Calls made to the repairer, forced retries included.
    pub generations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RepairGuard {
    config: GuardConfig,
}

impl RepairGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// One-shot check of a proposal. A no-op here is final; [`RepairGuard::run`]
    /// is the driver that grants the forced retry.
    pub fn apply(
        &self,
        original: &str,
        instruction: &RepairInstruction,
        proposed: &str,
    ) -> GuardDecision {
        if let Err(err) = preflight(instruction) {
            return GuardDecision::reject(original, err);
        }
        if proposed.trim().is_empty() {
            return GuardDecision::reject(
                original,
                RepairError::DestructiveRepairDetected {
                    reason: "proposal is empty".into(),
                },
            );
        }
        if is_no_op(original, proposed) {
            return GuardDecision::reject(original, RepairError::NoOpRepairDetected { retries: 0 });
        }
        self.check_structure(original, proposed)
    }

    /// Generate a repair and check it, granting the configured number of
    /// forced retries when the proposal is unchanged.
    pub fn run(
        &self,
        original: &str,
        instruction: &RepairInstruction,
        repairer: &mut dyn RepairModel,
        prompt: &str,
    ) -> GuardOutcome {
        if let Err(err) = preflight(instruction) {
            tracing::warn!(reason = %err, "repair skipped before generation");
            return GuardOutcome {
                decision: GuardDecision::reject(original, err),
                generations: 0,
            };
        }

        let mut generations = 1;
        let mut proposed = match generate_code(repairer, prompt) {
            Ok(code) => code,
            Err(err) => {
                return GuardOutcome {
                    decision: GuardDecision::reject(original, err),
                    generations,
                }
            }
        };

        let mut retries = 0;
        while is_no_op(original, &proposed) && retries < self.config.max_no_op_retries {
            retries += 1;
            generations += 1;
            tracing::info!(retry = retries, "repair made no change, forcing a retry");
            proposed = match generate_code(repairer, &no_op_retry_prompt(prompt)) {
                Ok(code) => code,
                Err(err) => {
                    return GuardOutcome {
                        decision: GuardDecision::reject(original, err),
                        generations,
                    }
                }
            };
        }
        if is_no_op(original, &proposed) {
            return GuardOutcome {
                decision: GuardDecision::reject(original, RepairError::NoOpRepairDetected { retries }),
                generations,
            };
        }

        GuardOutcome {
            decision: self.check_structure(original, &proposed),
            generations,
        }
    }

    fn check_structure(&self, original: &str, proposed: &str) -> GuardDecision {
        let before = non_main_function_names(original);
        if !before.is_empty() && non_main_function_names(proposed).is_empty() {
            let names: Vec<&str> = before.iter().map(String::as_str).collect();
            return GuardDecision::reject(
                original,
                RepairError::DestructiveRepairDetected {
                    reason: format!("all helper functions removed ({})", names.join(", ")),
                },
            );
        }

        let old_lines = line_count(original);
        let new_lines = line_count(proposed);
        let mut warning = None;
        if old_lines >= self.config.min_lines_for_size_check {
            let shift = old_lines.abs_diff(new_lines) as f64 / old_lines as f64;
            if shift > self.config.reject_size_shift_ratio {
                return GuardDecision::reject(
                    original,
                    RepairError::DestructiveRepairDetected {
                        reason: format!(
                            "line count changed {old_lines} -> {new_lines} ({:.0}%)",
                            shift * 100.0
                        ),
                    },
                );
            }
            if shift > self.config.warn_size_shift_ratio {
                let message = format!(
                    "line count changed {old_lines} -> {new_lines} ({:.0}%)",
                    shift * 100.0
                );
                tracing::warn!(reason = %message, "large repair accepted");
                warning = Some(message);
            }
        }

        GuardDecision::Accepted {
            code: proposed.to_string(),
            warning,
        }
    }
}

pub fn is_no_op(original: &str, proposed: &str) -> bool {
    normalize_whitespace(original) == normalize_whitespace(proposed)
}

fn generate_code(repairer: &mut dyn RepairModel, prompt: &str) -> Result<String, RepairError> {
    let raw = repairer
        .generate(prompt)
        .map_err(|err| RepairError::DestructiveRepairDetected {
            reason: format!("repairer failed: {err:#}"),
        })?;
    extract_c_code(&raw).ok_or_else(|| RepairError::DestructiveRepairDetected {
        reason: "repairer returned no code".into(),
    })
}

fn no_op_retry_prompt(prompt: &str) -> String {
    format!(
        "{prompt}\n\nYOU MADE NO CHANGE: your previous answer was identical to the CURRENT CODE.\n\
         Apply every edit in the REPAIR INSTRUCTIONS and output the full modified program.\n"
    )
}
