//! Error taxonomy.
//!
//! Everything in [`RepairError`] is recovered locally: the caller logs it and
//! moves on to the next artifact. Only [`ConfigError`] halts a run.

use std::path::PathBuf;

/// Recoverable per-artifact failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepairError {
    #[error("missing artifact for code_{code_id}: {what}")]
    MissingArtifact { code_id: u32, what: String },

    #[error("malformed repair instruction after {attempts} attempt(s): {reason}")]
    MalformedRepairInstruction { attempts: usize, reason: String },

    #[error("destructive repair rejected: {reason}")]
    DestructiveRepairDetected { reason: String },

    #[error("repair made no change after {retries} forced retry attempt(s)")]
    NoOpRepairDetected { retries: usize },

    #[error("feedback too sparse to act on: {preview}")]
    AmbiguousFeedback { preview: String },

    #[error("repair instruction breaches structural locks: {reason}")]
    ContractBreach { reason: String },
}

impl RepairError {
    /// Short machine-readable code used in logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            RepairError::MissingArtifact { .. } => "missing_artifact",
            RepairError::MalformedRepairInstruction { .. } => "malformed_repair_instruction",
            RepairError::DestructiveRepairDetected { .. } => "destructive_repair",
            RepairError::NoOpRepairDetected { .. } => "no_op_repair",
            RepairError::AmbiguousFeedback { .. } => "ambiguous_feedback",
            RepairError::ContractBreach { .. } => "contract_breach",
        }
    }
}

/// Fatal configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no input run directories configured or found")]
    NoInputDirectories,

    #[error("run directory does not exist: {}", .0.display())]
    MissingRunDirectory(PathBuf),

    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to parse config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_message_mentions_retry_count() {
        let err = RepairError::NoOpRepairDetected { retries: 1 };
        assert_eq!(
            err.to_string(),
            "repair made no change after 1 forced retry attempt(s)"
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RepairError::MissingArtifact { code_id: 1, what: "x".into() },
            RepairError::MalformedRepairInstruction { attempts: 3, reason: "x".into() },
            RepairError::DestructiveRepairDetected { reason: "x".into() },
            RepairError::NoOpRepairDetected { retries: 1 },
            RepairError::AmbiguousFeedback { preview: "x".into() },
            RepairError::ContractBreach { reason: "x".into() },
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
