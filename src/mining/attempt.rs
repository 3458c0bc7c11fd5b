//! Attempt collection from pipeline run directories.

use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::health::check_health;
use crate::config::{HealthConfig, RewardConfig};
use crate::error::RepairError;
use crate::layout::IterationDir;
use crate::prompts::fixer_prompt;
use crate::reward::RewardSignals;
use crate::util::read_non_empty;

/// One scored repair of one program in one iteration.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub code_id: u32,
    pub run_id: String,
    pub iteration: u32,
    pub prompt: String,
    pub fixed: String,
    pub reward: f64,
    pub signals: RewardSignals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub iterations: usize,
    pub incomplete: usize,
    pub rejected_by_health: usize,
}

impl CollectStats {
    fn merge(mut self, other: CollectStats) -> CollectStats {
        self.iterations += other.iterations;
        self.incomplete += other.incomplete;
        self.rejected_by_health += other.rejected_by_health;
        self
    }
}

#[derive(Debug, Default)]
pub struct CollectedAttempts {
    pub attempts: Vec<Attempt>,
    pub stats: CollectStats,
}

/// Walk every `iter_<n>` under each run directory, in parallel across iterations.
pub fn collect_attempts(
    run_dirs: &[PathBuf],
    health: &HealthConfig,
    reward: &RewardConfig,
) -> anyhow::Result<CollectedAttempts> {
    let mut iterations = Vec::new();
    for run_dir in run_dirs {
        iterations.extend(IterationDir::list(run_dir)?);
    }

    let per_iteration: Vec<anyhow::Result<CollectedAttempts>> = iterations
        .par_iter()
        .map(|iter_dir| collect_iteration(iter_dir, health, reward))
        .collect();

    let mut collected = CollectedAttempts::default();
    for result in per_iteration {
        let part = result?;
        collected.attempts.extend(part.attempts);
        collected.stats = collected.stats.merge(part.stats);
    }
    // Deterministic order regardless of scheduling.
    collected
        .attempts
        .sort_by(|a, b| (a.code_id, &a.run_id, a.iteration).cmp(&(b.code_id, &b.run_id, b.iteration)));
    Ok(collected)
}

fn collect_iteration(
    iter_dir: &IterationDir,
    health: &HealthConfig,
    reward: &RewardConfig,
) -> anyhow::Result<CollectedAttempts> {
    let mut out = CollectedAttempts {
        attempts: Vec::new(),
        stats: CollectStats {
            iterations: 1,
            ..CollectStats::default()
        },
    };

    for code_id in iter_dir.code_ids() {
        let Some((current, instructions, fixed)) = load_triple(iter_dir, code_id)? else {
            out.stats.incomplete += 1;
            continue;
        };

        if let Err(violation) = check_health(&current, &fixed, health) {
            tracing::info!(
                code_id,
                iteration = iter_dir.iteration,
                run = %iter_dir.run_id,
                reason = %violation,
                "attempt rejected by health filter"
            );
            out.stats.rejected_by_health += 1;
            continue;
        }

        let signals = RewardSignals::collect(&iter_dir.path, code_id)?;
        out.attempts.push(Attempt {
            code_id,
            run_id: iter_dir.run_id.clone(),
            iteration: iter_dir.iteration,
            prompt: fixer_prompt(&current, &instructions),
            fixed,
            reward: signals.score(reward.mode),
            signals,
        });
    }
    Ok(out)
}

fn load_triple(
    iter_dir: &IterationDir,
    code_id: u32,
) -> anyhow::Result<Option<(String, String, String)>> {
    let Some(current) = read_part(iter_dir, code_id, "cleaned code", &iter_dir.cleaned_code(code_id))?
    else {
        return Ok(None);
    };
    let Some(instructions) =
        read_part(iter_dir, code_id, "repair prompt", &iter_dir.repair_prompt(code_id))?
    else {
        return Ok(None);
    };
    let Some(fixed) =
        read_part(iter_dir, code_id, "generated code", &iter_dir.generated_code(code_id))?
    else {
        return Ok(None);
    };
    Ok(Some((current, instructions.trim().to_string(), fixed)))
}

fn read_part(
    iter_dir: &IterationDir,
    code_id: u32,
    what: &str,
    path: &Path,
) -> anyhow::Result<Option<String>> {
    let text = read_non_empty(path)?;
    if text.is_none() {
        log_missing(iter_dir, code_id, what, path);
    }
    Ok(text)
}

fn log_missing(iter_dir: &IterationDir, code_id: u32, what: &str, path: &Path) {
    let err = RepairError::MissingArtifact {
        code_id,
        what: format!("{what} ({})", path.display()),
    };
    tracing::debug!(
        code_id,
        iteration = iter_dir.iteration,
        run = %iter_dir.run_id,
        reason = %err,
        "skipping incomplete attempt"
    );
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_attempt, PROGRAM};
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collects_scored_attempts() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_a");
        write_attempt(&run, 1, 7, true);
        write_attempt(&run, 2, 7, false);

        let collected = collect_attempts(
            &[run],
            &HealthConfig::default(),
            &RewardConfig::default(),
        )
        .unwrap();
        assert_eq!(collected.stats.iterations, 2);
        let rewards: Vec<(u32, f64)> = collected
            .attempts
            .iter()
            .map(|a| (a.iteration, a.reward))
            .collect();
        assert_eq!(rewards, vec![(1, 1.0), (2, 3.0)]);
        assert!(collected.attempts[0].prompt.contains("REPAIR INSTRUCTIONS:\nTYPE FIX:"));
    }

    #[test]
    fn test_incomplete_triple_skipped() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_a");
        write_attempt(&run, 1, 3, false);
        fs::remove_file(run.join("iter_1/generated_code/repair_prompt_3.txt")).unwrap();

        let collected = collect_attempts(
            &[run],
            &HealthConfig::default(),
            &RewardConfig::default(),
        )
        .unwrap();
        assert!(collected.attempts.is_empty());
        assert_eq!(collected.stats.incomplete, 1);
    }

    #[test]
    fn test_unhealthy_fix_rejected() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_a");
        write_attempt(&run, 1, 4, false);
        fs::write(
            run.join("iter_1/generated_code/code_4.c"),
            "int main() {\n    return 0;\n}\n",
        )
        .unwrap();
        assert!(PROGRAM.contains("int add("));

        let collected = collect_attempts(
            &[run],
            &HealthConfig::default(),
            &RewardConfig::default(),
        )
        .unwrap();
        assert!(collected.attempts.is_empty());
        assert_eq!(collected.stats.rejected_by_health, 1);
    }
}
