//! One repair cycle per `(iteration, code_id)`.
//!
//! classify -> draft instruction -> guarded repair -> persist. Every
//! [`RepairError`] ends the cycle as an outcome value; only I/O failures
//! surface as `Err`.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::classify::{classify, ErrorCategory};
use crate::config::Config;
use crate::error::RepairError;
use crate::feedback::{select_active, FeedbackSource};
use crate::guard::{GuardDecision, RepairGuard};
use crate::layout::IterationDir;
use crate::model::RepairModel;
use crate::prompts::{analyzer_prompt, fixer_prompt};
use crate::protocol::{ProtocolSession, RepairInstruction, SessionOutcome, ValidationContext};
use crate::util::{read_non_empty, truncate};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleStatus {
    /// The proposal passed the guard and was written.
    Repaired { warning: Option<String> },
    /// The guard or protocol failed; the prior code was written instead.
    KeptOriginal {
        #[serde(serialize_with = "serialize_error")]
        error: RepairError,
    },
    /// Nothing was written for this artifact.
    Skipped {
        #[serde(serialize_with = "serialize_error")]
        error: RepairError,
    },
    /// No tool reported anything.
    Clean,
}

fn serialize_error<S: serde::Serializer>(err: &RepairError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub code_id: u32,
    pub run_id: String,
    pub iteration: u32,
    pub feedback_source: Option<FeedbackSource>,
    pub category: Option<ErrorCategory>,
    pub protocol_attempts: usize,
    pub degraded: bool,
    pub generations: usize,
    pub status: CycleStatus,
}

impl CycleOutcome {
    fn new(iter_dir: &IterationDir, code_id: u32) -> Self {
        Self {
            code_id,
            run_id: iter_dir.run_id.clone(),
            iteration: iter_dir.iteration,
            feedback_source: None,
            category: None,
            protocol_attempts: 0,
            degraded: false,
            generations: 0,
            status: CycleStatus::Clean,
        }
    }

    pub fn error(&self) -> Option<&RepairError> {
        match &self.status {
            CycleStatus::KeptOriginal { error } | CycleStatus::Skipped { error } => Some(error),
            CycleStatus::Repaired { .. } | CycleStatus::Clean => None,
        }
    }

    fn finish(mut self, status: CycleStatus) -> Self {
        match &status {
            CycleStatus::Repaired { warning } => tracing::info!(
                code_id = self.code_id,
                iteration = self.iteration,
                warning = warning.as_deref().unwrap_or(""),
                "repair accepted"
            ),
            CycleStatus::KeptOriginal { error } => tracing::warn!(
                code_id = self.code_id,
                iteration = self.iteration,
                kind = error.code(),
                reason = %error,
                "repair rejected, keeping prior code"
            ),
            CycleStatus::Skipped { error } => tracing::info!(
                code_id = self.code_id,
                iteration = self.iteration,
                kind = error.code(),
                reason = %error,
                "cycle skipped"
            ),
            CycleStatus::Clean => tracing::debug!(
                code_id = self.code_id,
                iteration = self.iteration,
                "no feedback, nothing to repair"
            ),
        }
        self.status = status;
        self
    }
}

/// Drives analyzer and fixer for artifacts of one iteration directory.
pub struct RepairCycle<'a> {
    config: &'a Config,
    guard: RepairGuard,
}

impl<'a> RepairCycle<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            guard: RepairGuard::new(config.guard.clone()),
        }
    }

    /// Run a cycle for every code id found in `iter_dir`.
    pub fn run_iteration(
        &self,
        iter_dir: &IterationDir,
        analyzer: &mut dyn RepairModel,
        fixer: &mut dyn RepairModel,
    ) -> anyhow::Result<Vec<CycleOutcome>> {
        iter_dir
            .code_ids()
            .into_iter()
            .map(|code_id| self.run(iter_dir, code_id, analyzer, fixer))
            .collect()
    }

    pub fn run(
        &self,
        iter_dir: &IterationDir,
        code_id: u32,
        analyzer: &mut dyn RepairModel,
        fixer: &mut dyn RepairModel,
    ) -> anyhow::Result<CycleOutcome> {
        let mut outcome = CycleOutcome::new(iter_dir, code_id);

        let code_path = iter_dir.cleaned_code(code_id);
        let Some(current) = read_non_empty(&code_path)? else {
            return Ok(outcome.finish(CycleStatus::Skipped {
                error: RepairError::MissingArtifact {
                    code_id,
                    what: format!("cleaned code ({})", code_path.display()),
                },
            }));
        };

        let Some(report) = select_active(&iter_dir.feedback_dir(), code_id)? else {
            return Ok(outcome.finish(CycleStatus::Clean));
        };
        outcome.feedback_source = Some(report.source);
        if report.is_ambiguous() {
            return Ok(outcome.finish(CycleStatus::Skipped {
                error: RepairError::AmbiguousFeedback {
                    preview: truncate(report.text.trim(), 80),
                },
            }));
        }

        let classification = classify(&report.text);
        outcome.category = Some(classification.category);
        tracing::debug!(
            code_id,
            iteration = iter_dir.iteration,
            source = %report.source,
            category = %classification.category,
            "feedback classified"
        );

        let ctx = ValidationContext {
            program: &current,
            category: classification.category,
            symptoms: &classification.symptoms,
            forbidden_phrases: &self.config.protocol.forbidden_phrases,
        };
        let mut session = ProtocolSession::new(ctx, self.config.protocol.max_attempts);
        let drafted = session.run(
            analyzer,
            &analyzer_prompt(&current, &report.text, &classification),
        );
        outcome.protocol_attempts = drafted.attempts();
        outcome.degraded = drafted.is_degraded();

        let instruction_text = drafted.text();
        write_text(&iter_dir.repair_prompt(code_id), &instruction_text)?;

        let instruction = match &drafted {
            SessionOutcome::Accepted { instruction, .. } => instruction.instruction.clone(),
            SessionOutcome::DegradedAccepted { text, .. } => {
                if text.trim().is_empty() {
                    write_text(&iter_dir.generated_code(code_id), &current)?;
                    let error = drafted
                        .degradation()
                        .unwrap_or(RepairError::MalformedRepairInstruction {
                            attempts: outcome.protocol_attempts,
                            reason: "no draft produced".into(),
                        });
                    return Ok(outcome.finish(CycleStatus::KeptOriginal { error }));
                }
                RepairInstruction::parse_lenient(text)
            }
        };

        let guarded = self.guard.run(
            &current,
            &instruction,
            fixer,
            &fixer_prompt(&current, &instruction_text),
        );
        outcome.generations = guarded.generations;
        write_text(&iter_dir.generated_code(code_id), guarded.decision.code())?;

        let status = match guarded.decision {
            GuardDecision::Accepted { warning, .. } => CycleStatus::Repaired { warning },
            GuardDecision::Rejected { error, .. } => CycleStatus::KeptOriginal { error },
        };
        Ok(outcome.finish(status))
    }
}

fn write_text(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scripted::ScriptedModel;
    use tempfile::{tempdir, TempDir};

    const PROGRAM: &str = "#include <stdio.h>\n\
        int twice(int x) {\n    return x * 2;\n}\n\
        int main() {\n    int result;\n    result = twice(3);\n    printf(\"%d\\n\", result);\n    return 0;\n}\n";

    const TYPE_FIX: &str = "MEMORY MODEL FIX:\n(none)\n\nBOUNDS / ACCESS FIX:\n(none)\n\n\
        FUNCTION SIGNATURE FIX:\n(none)\n\nTYPE FIX:\n- Replace \"int result;\" with \"long result;\"\n";

    fn setup(feedback: Option<&str>) -> (TempDir, IterationDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run_a").join("iter_2");
        fs::create_dir_all(path.join("cleaned_code")).unwrap();
        fs::create_dir_all(path.join("feedback")).unwrap();
        fs::write(path.join("cleaned_code/code_5.c"), PROGRAM).unwrap();
        if let Some(text) = feedback {
            fs::write(path.join("feedback/feedback_compile_code_5.txt"), text).unwrap();
        }
        let iter = IterationDir::from_path(&path).unwrap();
        (dir, iter)
    }

    fn fixed_program() -> String {
        format!("```c\n{}```", PROGRAM.replace("int result;", "long result;"))
    }

    const CONFLICT: &str = "code_5.c:6:9: error: conflicting types for 'result'\n1 error generated.\n";

    #[test]
    fn test_accepted_repair_is_written() {
        let (_dir, iter) = setup(Some(CONFLICT));
        let config = Config::default();
        let mut analyzer = ScriptedModel::new([TYPE_FIX]);
        let mut fixer = ScriptedModel::new([fixed_program()]);

        let outcome = RepairCycle::new(&config)
            .run(&iter, 5, &mut analyzer, &mut fixer)
            .unwrap();
        assert_eq!(outcome.status, CycleStatus::Repaired { warning: None });
        assert_eq!(outcome.category, Some(ErrorCategory::TypeMismatch));
        assert_eq!(outcome.protocol_attempts, 1);
        assert!(!outcome.degraded);

        let written = fs::read_to_string(iter.generated_code(5)).unwrap();
        assert!(written.contains("long result;"));
        let persisted = fs::read_to_string(iter.repair_prompt(5)).unwrap();
        assert!(persisted.contains("TYPE FIX:\n- Replace \"int result;\" with \"long result;\""));
        assert!(fixer.prompts[0].contains("REPAIR INSTRUCTIONS:\nMEMORY MODEL FIX:"));
    }

    #[test]
    fn test_degraded_draft_still_persisted() {
        let (_dir, iter) = setup(Some(CONFLICT));
        let config = Config::default();
        let mut analyzer = ScriptedModel::new(["fix the bug", "fix the bug", "TYPE FIX:\n(none)"]);
        let mut fixer = ScriptedModel::new([fixed_program()]);

        let outcome = RepairCycle::new(&config)
            .run(&iter, 5, &mut analyzer, &mut fixer)
            .unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.protocol_attempts, 3);
        assert_eq!(analyzer.calls(), 3);
        assert_eq!(
            fs::read_to_string(iter.repair_prompt(5)).unwrap(),
            "TYPE FIX:\n(none)"
        );
        assert!(matches!(outcome.status, CycleStatus::Repaired { .. }));
    }

    #[test]
    fn test_breaching_instruction_keeps_prior_code() {
        let (_dir, iter) = setup(Some(CONFLICT));
        let config = Config::default();
        let breach = "MEMORY MODEL FIX:\n(none)\nBOUNDS / ACCESS FIX:\n(none)\n\
            FUNCTION SIGNATURE FIX:\n(none)\nTYPE FIX:\n- Replace \"int result;\" with \"int result = 0;\"\n";
        let mut analyzer = ScriptedModel::new([breach]);
        let mut fixer = ScriptedModel::default();

        let outcome = RepairCycle::new(&config)
            .run(&iter, 5, &mut analyzer, &mut fixer)
            .unwrap();
        assert!(matches!(
            outcome.error(),
            Some(RepairError::ContractBreach { .. })
        ));
        assert_eq!(fixer.calls(), 0);
        assert_eq!(fs::read_to_string(iter.generated_code(5)).unwrap(), PROGRAM);
    }

    #[test]
    fn test_no_op_repair_retried_once_then_kept() {
        let (_dir, iter) = setup(Some(CONFLICT));
        let config = Config::default();
        let mut analyzer = ScriptedModel::new([TYPE_FIX]);
        let unchanged = format!("```c\n{PROGRAM}```");
        let mut fixer = ScriptedModel::new([unchanged.clone(), unchanged]);

        let outcome = RepairCycle::new(&config)
            .run(&iter, 5, &mut analyzer, &mut fixer)
            .unwrap();
        assert_eq!(
            outcome.error(),
            Some(&RepairError::NoOpRepairDetected { retries: 1 })
        );
        assert_eq!(outcome.generations, 2);
        assert!(fixer.prompts[1].contains("YOU MADE NO CHANGE"));
        assert_eq!(fs::read_to_string(iter.generated_code(5)).unwrap(), PROGRAM);
    }

    #[test]
    fn test_ambiguous_and_missing_feedback() {
        let (_dir, iter) = setup(Some("CodeQL results:\n"));
        let config = Config::default();
        let cycle = RepairCycle::new(&config);
        let mut analyzer = ScriptedModel::default();
        let mut fixer = ScriptedModel::default();

        let outcome = cycle.run(&iter, 5, &mut analyzer, &mut fixer).unwrap();
        assert!(matches!(
            outcome.error(),
            Some(RepairError::AmbiguousFeedback { .. })
        ));
        assert_eq!(analyzer.calls(), 0);

        let (_dir, iter) = setup(None);
        let outcome = cycle.run(&iter, 5, &mut analyzer, &mut fixer).unwrap();
        assert_eq!(outcome.status, CycleStatus::Clean);
        assert!(!iter.generated_code(5).exists());
    }

    #[test]
    fn test_missing_artifact_skipped() {
        let (_dir, iter) = setup(Some(CONFLICT));
        let config = Config::default();
        let mut analyzer = ScriptedModel::default();
        let mut fixer = ScriptedModel::default();

        let outcome = RepairCycle::new(&config)
            .run(&iter, 9, &mut analyzer, &mut fixer)
            .unwrap();
        assert!(matches!(
            outcome.error(),
            Some(RepairError::MissingArtifact { code_id: 9, .. })
        ));
    }
}
