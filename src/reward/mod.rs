//! Attempt scoring from compiler, KLEE and CodeQL outcomes.
//!
//! Two modes exist. `Ordinal` counts clean analyzers (0..=3) and is what
//! the miner has always ranked by; `Weighted` breaks ties with test-case,
//! crash and warning information. A mining session uses one mode for every
//! attempt.

mod signals;

pub use signals::{lists_code_id, parse_codeql_issues, RewardSignals};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardMode {
    #[default]
    Ordinal,
    Weighted,
}

impl fmt::Display for RewardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardMode::Ordinal => f.write_str("ordinal"),
            RewardMode::Weighted => f.write_str("weighted"),
        }
    }
}

impl FromStr for RewardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordinal" => Ok(RewardMode::Ordinal),
            "weighted" => Ok(RewardMode::Weighted),
            other => Err(format!("unknown reward mode '{other}' (expected ordinal|weighted)")),
        }
    }
}

impl RewardSignals {
    pub fn score(&self, mode: RewardMode) -> f64 {
        match mode {
            RewardMode::Ordinal => f64::from(self.ordinal()),
            RewardMode::Weighted => self.weighted(),
        }
    }

    pub fn ordinal(&self) -> u8 {
        u8::from(self.compile_ok) + u8::from(self.klee_errors == 0) + u8::from(self.codeql_issues == 0)
    }

    pub fn weighted(&self) -> f64 {
        let compile = if self.compile_ok { 3.0 } else { 0.0 };
        compile + 2.0 * self.klee_score() + self.codeql_score() - self.warning_penalty()
    }

    /// In `[-1, 1]`: credit for generated tests and a clean run, minus a
    /// per-error and a crash penalty.
    pub fn klee_score(&self) -> f64 {
        let tests = if self.klee_test_cases > 0 { 0.4 } else { 0.0 };
        let errors = if self.klee_errors == 0 {
            0.6
        } else {
            -0.1 * self.klee_errors as f64
        };
        let crash = if self.klee_crashed { 0.5 } else { 0.0 };
        (tests + errors - crash).clamp(-1.0, 1.0)
    }

    pub fn codeql_score(&self) -> f64 {
        if self.codeql_issues == 0 {
            1.0
        } else {
            1.0 / (1.0 + self.codeql_issues as f64)
        }
    }

    pub fn warning_penalty(&self) -> f64 {
        (0.02 * self.compiler_warnings as f64).min(0.5)
    }
}
