//! Bounded drafting loop for repair instructions.

use serde::Serialize;

use super::rules::{validate, RejectionReason, ValidRepairInstruction, ValidationContext};
use crate::error::RepairError;
use crate::model::RepairModel;

/// States a session passes through. `Retrying(n)` means draft `n` was
/// rejected and another is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Drafting,
    Validating,
    Retrying(usize),
    Accepted,
    DegradedAccepted,
}

/// One draft and what the rules said about it.
#[derive(Debug, Clone, Serialize)]
pub struct DraftRecord {
    pub attempt: usize,
    pub text: Option<String>,
    pub rejection: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Accepted {
        instruction: ValidRepairInstruction,
        attempts: usize,
    },
    /// Every attempt failed; the last draft is handed on anyway.
    DegradedAccepted {
        text: String,
        attempts: usize,
        last_rejection: String,
    },
}

impl SessionOutcome {
    /// Text to persist and hand to the fixer.
    pub fn text(&self) -> String {
        match self {
            SessionOutcome::Accepted { instruction, .. } => instruction.render(),
            SessionOutcome::DegradedAccepted { text, .. } => text.clone(),
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            SessionOutcome::Accepted { attempts, .. }
            | SessionOutcome::DegradedAccepted { attempts, .. } => *attempts,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SessionOutcome::DegradedAccepted { .. })
    }

    /// The protocol failure a degraded outcome stands for.
    pub fn degradation(&self) -> Option<RepairError> {
        match self {
            SessionOutcome::Accepted { .. } => None,
            SessionOutcome::DegradedAccepted {
                attempts,
                last_rejection,
                ..
            } => Some(RepairError::MalformedRepairInstruction {
                attempts: *attempts,
                reason: last_rejection.clone(),
            }),
        }
    }
}

pub struct ProtocolSession<'a> {
    ctx: ValidationContext<'a>,
    max_attempts: usize,
    state: SessionState,
    trace: Vec<SessionState>,
    drafts: Vec<DraftRecord>,
}

impl<'a> ProtocolSession<'a> {
    pub fn new(ctx: ValidationContext<'a>, max_attempts: usize) -> Self {
        Self {
            ctx,
            max_attempts: max_attempts.max(1),
            state: SessionState::Drafting,
            trace: vec![SessionState::Drafting],
            drafts: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn trace(&self) -> &[SessionState] {
        &self.trace
    }

    pub fn drafts(&self) -> &[DraftRecord] {
        &self.drafts
    }

    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.trace.push(state);
    }

    /// Draft, validate and re-prompt until a draft passes or the attempt cap
    /// is reached. Never loops past `max_attempts`.
    pub fn run(&mut self, model: &mut dyn RepairModel, base_prompt: &str) -> SessionOutcome {
        let mut prompt = base_prompt.to_string();
        let mut last_text = String::new();
        let mut last_rejection = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                self.enter(SessionState::Drafting);
            }
            let draft = match model.generate(&prompt) {
                Ok(text) => text,
                Err(err) => {
                    last_rejection = format!("drafter error: {err:#}");
                    tracing::warn!(attempt, reason = %last_rejection, "instruction drafting failed");
                    self.drafts.push(DraftRecord {
                        attempt,
                        text: None,
                        rejection: Some(last_rejection.clone()),
                    });
                    if attempt < self.max_attempts {
                        self.enter(SessionState::Retrying(attempt));
                    }
                    continue;
                }
            };
            let draft = clean_draft(&draft);

            self.enter(SessionState::Validating);
            match validate(&draft, &self.ctx) {
                Ok(instruction) => {
                    self.drafts.push(DraftRecord {
                        attempt,
                        text: Some(draft),
                        rejection: None,
                    });
                    self.enter(SessionState::Accepted);
                    if !instruction.corrections.is_empty() {
                        tracing::info!(
                            attempt,
                            corrections = instruction.corrections.len(),
                            "out-of-scope edits moved into BOUNDS / ACCESS FIX"
                        );
                    }
                    return SessionOutcome::Accepted {
                        instruction,
                        attempts: attempt,
                    };
                }
                Err(reason) => {
                    tracing::debug!(attempt, reason = %reason, "instruction draft rejected");
                    last_rejection = reason.to_string();
                    self.drafts.push(DraftRecord {
                        attempt,
                        text: Some(draft.clone()),
                        rejection: Some(last_rejection.clone()),
                    });
                    last_text = draft;
                    if attempt < self.max_attempts {
                        self.enter(SessionState::Retrying(attempt));
                        prompt = retry_prompt(base_prompt, &reason);
                    }
                }
            }
        }

        self.enter(SessionState::DegradedAccepted);
        tracing::warn!(
            attempts = self.max_attempts,
            reason = %last_rejection,
            "no valid instruction within attempt cap, keeping last draft"
        );
        SessionOutcome::DegradedAccepted {
            text: last_text,
            attempts: self.max_attempts,
            last_rejection,
        }
    }
}

/// Drop anything from the first code fence on; instructions never carry code
/// blocks.
fn clean_draft(text: &str) -> String {
    let text = text.trim();
    match text.find("```") {
        Some(idx) => text[..idx].trim().to_string(),
        None => text.to_string(),
    }
}

fn retry_prompt(base_prompt: &str, reason: &RejectionReason) -> String {
    format!(
        "{base_prompt}\n\nYOUR PREVIOUS ANSWER WAS REJECTED: {reason}\n\
         Answer again using exactly the four section headers. Each section is either (none) \
         or atomic edits of the form Replace \"<line>\" with \"<line>\", Remove \"<line>\", \
         Insert \"<line>\" before \"<line>\". Quote program lines exactly and never mention \
         line numbers.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::config::ProtocolConfig;
    use crate::model::scripted::ScriptedModel;

    const PROGRAM: &str = "int main() {\n    int n = 0;\n    return 10 / n;\n}\n";
    const VALID: &str = "MEMORY MODEL FIX:\n(none)\nBOUNDS / ACCESS FIX:\nInsert \"if (n == 0) return 1;\" before \"return 10 / n;\"\nFUNCTION SIGNATURE FIX:\n(none)\nTYPE FIX:\n(none)";
    const INVALID: &str = "Just add a check somewhere.";

    fn session_run(model: &mut ScriptedModel) -> (SessionOutcome, Vec<SessionState>) {
        let c = classify("KLEE: ERROR: division by zero");
        let phrases = ProtocolConfig::default().forbidden_phrases;
        let ctx = ValidationContext {
            program: PROGRAM,
            category: c.category,
            symptoms: &c.symptoms,
            forbidden_phrases: &phrases,
        };
        let mut session = ProtocolSession::new(ctx, 3);
        let outcome = session.run(model, "BASE PROMPT");
        (outcome, session.trace().to_vec())
    }

    #[test]
    fn test_first_valid_draft_is_accepted() {
        let mut model = ScriptedModel::new([VALID]);
        let (outcome, trace) = session_run(&mut model);
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(
            trace,
            vec![SessionState::Drafting, SessionState::Validating, SessionState::Accepted]
        );
    }

    #[test]
    fn test_retry_prompt_carries_rejection_reason() {
        let mut model = ScriptedModel::new([INVALID, VALID]);
        let (outcome, trace) = session_run(&mut model);
        assert_eq!(outcome.attempts(), 2);
        assert!(trace.contains(&SessionState::Retrying(1)));
        assert_eq!(model.prompts[0], "BASE PROMPT");
        assert!(model.prompts[1].contains("YOUR PREVIOUS ANSWER WAS REJECTED: missing section header"));
    }

    #[test]
    fn test_cap_exhaustion_degrades_with_last_draft() {
        let mut model = ScriptedModel::new([INVALID, INVALID, "still not it", VALID]);
        let (outcome, trace) = session_run(&mut model);
        assert_eq!(model.calls(), 3);
        assert_eq!(trace.last(), Some(&SessionState::DegradedAccepted));
        match &outcome {
            SessionOutcome::DegradedAccepted { text, attempts, .. } => {
                assert_eq!(text, "still not it");
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            outcome.degradation(),
            Some(RepairError::MalformedRepairInstruction { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_drafter_errors_count_as_attempts() {
        let mut model = ScriptedModel::default()
            .push_error("connection reset")
            .push_error("connection reset")
            .push(VALID);
        let (outcome, _) = session_run(&mut model);
        assert_eq!(outcome.attempts(), 3);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn test_code_fence_is_cut_from_draft() {
        let fenced = format!("{VALID}\n```c\nint main() {{}}\n```");
        let mut model = ScriptedModel::new([fenced]);
        let (outcome, _) = session_run(&mut model);
        assert!(!outcome.is_degraded());
    }
}
