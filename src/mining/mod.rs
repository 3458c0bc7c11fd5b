//! Preference-pair mining.
//!
//! Attempts for the same program are ranked by reward; the best and worst
//! become one `(chosen, rejected)` pair, at most once per key ever.

mod attempt;
mod health;
mod manual;
mod registry;

pub use attempt::{collect_attempts, Attempt, CollectStats, CollectedAttempts};
pub use health::{check_health, HealthViolation};
pub use manual::{collect_manual_pairs, ManualPairs};
pub use registry::{PairKey, RegistryLock, SeenPairRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;
use crate::reward::RewardMode;
use crate::util::append_jsonl;

/// One line of the pair output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencePair {
    pub prompt: String,
    pub chosen: String,
    pub rejected: String,
    pub code_id: u32,
}

/// Emit one pair per `code_id` whose best attempt strictly beats its worst,
/// skipping and recording keys through `registry`.
pub fn mine(attempts: &[Attempt], registry: &mut SeenPairRegistry) -> Vec<PreferencePair> {
    mine_counted(attempts, registry).0
}

fn mine_counted(
    attempts: &[Attempt],
    registry: &mut SeenPairRegistry,
) -> (Vec<PreferencePair>, usize) {
    let mut by_code: BTreeMap<u32, Vec<&Attempt>> = BTreeMap::new();
    for attempt in attempts {
        by_code.entry(attempt.code_id).or_default().push(attempt);
    }

    let mut pairs = Vec::new();
    let mut skipped = 0;
    for (code_id, mut group) in by_code {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| {
            a.reward
                .total_cmp(&b.reward)
                .then(a.iteration.cmp(&b.iteration))
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        let (Some(worst), Some(best)) = (group.first(), group.last()) else {
            continue;
        };
        if best.reward <= worst.reward {
            continue;
        }

        let key = PairKey::Mined {
            code_id,
            best_run: best.run_id.clone(),
            best_iteration: best.iteration,
            worst_run: worst.run_id.clone(),
            worst_iteration: worst.iteration,
        };
        if registry.contains(&key) {
            tracing::debug!(code_id, "pair already mined");
            skipped += 1;
            continue;
        }
        registry.add(key);
        tracing::debug!(
            code_id,
            best_iteration = best.iteration,
            worst_iteration = worst.iteration,
            best_reward = best.reward,
            worst_reward = worst.reward,
            "new preference pair"
        );
        pairs.push(PreferencePair {
            prompt: best.prompt.clone(),
            chosen: best.fixed.clone(),
            rejected: worst.fixed.clone(),
            code_id,
        });
    }
    (pairs, skipped)
}

#[derive(Debug, Clone, Serialize)]
pub struct MiningReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reward_mode: RewardMode,
    pub run_dirs: Vec<PathBuf>,
    pub iterations: usize,
    pub attempts: usize,
    pub incomplete: usize,
    pub rejected_by_health: usize,
    pub skipped_seen: usize,
    pub new_pairs: usize,
    pub manual_pairs: usize,
    pub registry_size: usize,
}

/// One end-to-end mining pass: lock, collect, mine, persist, append.
pub struct MiningSession<'a> {
    config: &'a Config,
    run_dirs: Vec<PathBuf>,
}

impl<'a> MiningSession<'a> {
    pub fn new(config: &'a Config, run_dirs: Vec<PathBuf>) -> Self {
        Self { config, run_dirs }
    }

    pub fn run(&self) -> anyhow::Result<MiningReport> {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let paths = &self.config.paths;
        tracing::info!(%session_id, runs = self.run_dirs.len(), mode = %self.config.reward.mode, "mining session started");

        let mut registry = SeenPairRegistry::open_locked(&paths.seen_registry)?;

        let collected = collect_attempts(&self.run_dirs, &self.config.health, &self.config.reward)?;
        let (mut pairs, mut skipped_seen) = mine_counted(&collected.attempts, &mut registry);
        let new_mined = pairs.len();

        let mut incomplete = collected.stats.incomplete;
        let mut rejected_by_health = collected.stats.rejected_by_health;
        if let Some(manual_dir) = &paths.manual_pairs_dir {
            let manual = collect_manual_pairs(manual_dir, &self.config.health)?;
            incomplete += manual.incomplete;
            rejected_by_health += manual.rejected_by_health;
            for pair in manual.pairs {
                if registry.add(PairKey::Manual { code_id: pair.code_id }) {
                    pairs.push(pair);
                } else {
                    skipped_seen += 1;
                }
            }
        }
        let manual_pairs = pairs.len() - new_mined;

        // Registry first: a failed append loses pairs, never duplicates them.
        let registry_size = registry.persist()?;
        append_jsonl(&paths.pairs_output, &pairs)?;

        let report = MiningReport {
            session_id,
            started_at,
            finished_at: Utc::now(),
            reward_mode: self.config.reward.mode,
            run_dirs: self.run_dirs.clone(),
            iterations: collected.stats.iterations,
            attempts: collected.attempts.len(),
            incomplete,
            rejected_by_health,
            skipped_seen,
            new_pairs: pairs.len(),
            manual_pairs,
            registry_size,
        };
        tracing::info!(
            %session_id,
            attempts = report.attempts,
            new_pairs = report.new_pairs,
            skipped = report.skipped_seen,
            registry_size,
            "mining session finished"
        );
        Ok(report)
    }
}
