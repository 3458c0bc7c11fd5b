//! Configuration for repairloop
//!
//! Read from a TOML file (default `repairloop.toml` in the working directory).
//! Every key is optional; anything left out takes the default below.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::reward::RewardMode;

pub const DEFAULT_CONFIG_FILE: &str = "repairloop.toml";
/// Path list (platform separator) of run directories to mine.
pub const RUNS_ENV: &str = "REPAIRLOOP_RUNS";
/// Directory whose most recently modified child is the run to mine.
pub const RUNS_ROOT_ENV: &str = "REPAIRLOOP_RUNS_ROOT";
/// Hard ceiling on drafting attempts per protocol session.
pub const MAX_PROTOCOL_ATTEMPTS: usize = 3;
/// Hard ceiling on forced retries after a no-op generation.
pub const MAX_NO_OP_RETRIES: usize = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub protocol: ProtocolConfig,
    pub guard: GuardConfig,
    pub reward: RewardConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Run directories, each holding `iter_<n>` folders.
    pub runs: Vec<PathBuf>,
    /// Fallback when `runs` is empty: pick the newest child directory.
    pub runs_root: Option<PathBuf>,
    /// Hand-curated `code_<id>/{chosen,rejected,current}.c` pairs.
    pub manual_pairs_dir: Option<PathBuf>,
    pub pairs_output: PathBuf,
    pub seen_registry: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            runs_root: None,
            manual_pairs_dir: Some(PathBuf::from("manual_dpo")),
            pairs_output: PathBuf::from("dpo_data.jsonl"),
            seen_registry: PathBuf::from("seen_pairs.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Drafts requested before the last one is accepted as degraded.
    pub max_attempts: usize,
    /// Vague phrases rejected outside quoted code (case-insensitive).
    pub forbidden_phrases: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            forbidden_phrases: [
                "as needed",
                "if necessary",
                "as appropriate",
                "appropriately",
                "where applicable",
                "and so on",
                "etc.",
                "you may want to",
                "consider ",
                "make sure",
                "fix the logic",
                "fix the bug",
                "handle edge cases",
                "refactor",
                "rewrite the function",
                "rewrite the program",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub max_no_op_retries: usize,
    pub min_lines_for_size_check: usize,
    pub reject_size_shift_ratio: f64,
    pub warn_size_shift_ratio: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_no_op_retries: 1,
            min_lines_for_size_check: 10,
            reject_size_shift_ratio: 0.5,
            warn_size_shift_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub mode: RewardMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Length checks only apply when the current code has this many non-blank lines.
    pub min_current_lines: usize,
    pub min_fixed_lines: usize,
    pub min_line_ratio: f64,
    /// Share of the current code's functions that must survive in the fix.
    pub min_function_survival: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_current_lines: 10,
            min_fixed_lines: 5,
            min_line_ratio: 0.5,
            min_function_survival: 0.7,
        }
    }
}

impl Config {
    /// Load config from `path`, or return defaults.
    ///
    /// A missing file is normal. An unreadable or invalid file is moved aside
    /// to `<name>.corrupt` and defaults are used with a warning.
    pub fn load(path: &Path) -> Self {
        match Self::load_strict(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(err) => {
                if matches!(err, ConfigError::Parse { .. }) {
                    preserve_corrupt_config(path);
                }
                tracing::warn!(
                    path = %path.display(),
                    reason = %err,
                    "config file rejected, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate `path`. `Ok(None)` when the file does not exist.
    pub fn load_strict(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConfigError::InvalidValue {
                    field: "config file",
                    reason: format!("cannot read '{}': {}", path.display(), err),
                })
            }
        };
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PROTOCOL_ATTEMPTS).contains(&self.protocol.max_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "protocol.max_attempts",
                reason: format!("must be between 1 and {MAX_PROTOCOL_ATTEMPTS}"),
            });
        }
        if self.guard.max_no_op_retries > MAX_NO_OP_RETRIES {
            return Err(ConfigError::InvalidValue {
                field: "guard.max_no_op_retries",
                reason: format!("must be at most {MAX_NO_OP_RETRIES}"),
            });
        }
        check_ratio("guard.reject_size_shift_ratio", self.guard.reject_size_shift_ratio)?;
        check_ratio("guard.warn_size_shift_ratio", self.guard.warn_size_shift_ratio)?;
        if self.guard.warn_size_shift_ratio > self.guard.reject_size_shift_ratio {
            return Err(ConfigError::InvalidValue {
                field: "guard.warn_size_shift_ratio",
                reason: format!(
                    "{} exceeds reject_size_shift_ratio {}",
                    self.guard.warn_size_shift_ratio, self.guard.reject_size_shift_ratio
                ),
            });
        }
        check_ratio("health.min_line_ratio", self.health.min_line_ratio)?;
        check_ratio("health.min_function_survival", self.health.min_function_survival)?;
        if self.paths.pairs_output.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths.pairs_output",
                reason: "must not be empty".into(),
            });
        }
        if self.paths.seen_registry.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths.seen_registry",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Run directories to mine, honoring the environment overrides.
    pub fn resolve_run_dirs(&self) -> Result<Vec<PathBuf>, ConfigError> {
        self.resolve_run_dirs_with(std::env::var_os(RUNS_ENV), std::env::var_os(RUNS_ROOT_ENV))
    }

    /// Resolution order: explicit run list (env, then file), then the newest
    /// directory under the runs root (env, then file).
    pub fn resolve_run_dirs_with(
        &self,
        runs_env: Option<OsString>,
        root_env: Option<OsString>,
    ) -> Result<Vec<PathBuf>, ConfigError> {
        let explicit: Vec<PathBuf> = match runs_env.filter(|v| !v.is_empty()) {
            Some(value) => std::env::split_paths(&value).collect(),
            None => self.paths.runs.clone(),
        };

        let mut missing = None;
        let existing: Vec<PathBuf> = explicit
            .into_iter()
            .filter(|dir| {
                let ok = dir.is_dir();
                if !ok {
                    tracing::warn!(path = %dir.display(), "run directory not found, skipping");
                    missing.get_or_insert_with(|| dir.clone());
                }
                ok
            })
            .collect();
        if !existing.is_empty() {
            return Ok(existing);
        }

        let root = root_env
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.paths.runs_root.clone());
        if let Some(root) = root {
            if let Some(latest) = latest_child_dir(&root) {
                tracing::info!(path = %latest.display(), "using most recent run directory");
                return Ok(vec![latest]);
            }
            tracing::warn!(path = %root.display(), "runs root has no run directories");
        }

        match missing {
            Some(dir) => Err(ConfigError::MissingRunDirectory(dir)),
            None => Err(ConfigError::NoInputDirectories),
        }
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value} is not in (0, 1]"),
        })
    }
}

fn latest_child_dir(root: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

fn preserve_corrupt_config(path: &Path) {
    let mut corrupt = path.as_os_str().to_owned();
    corrupt.push(".corrupt");
    let corrupt_path = PathBuf::from(corrupt);
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::copy(path, &corrupt_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml"));
        assert_eq!(config.protocol.max_attempts, 3);
        assert_eq!(config.guard.max_no_op_retries, 1);
        assert_eq!(config.reward.mode, RewardMode::Ordinal);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repairloop.toml");
        fs::write(
            &path,
            "[reward]\nmode = \"weighted\"\n\n[health]\nmin_fixed_lines = 8\n",
        )
        .unwrap();
        let config = Config::load_strict(&path).unwrap().unwrap();
        assert_eq!(config.reward.mode, RewardMode::Weighted);
        assert_eq!(config.health.min_fixed_lines, 8);
        assert_eq!(config.health.min_current_lines, 10);
        assert_eq!(config.paths.seen_registry, PathBuf::from("seen_pairs.json"));
    }

    #[test]
    fn test_corrupt_file_is_preserved_and_defaults_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repairloop.toml");
        fs::write(&path, "[guard\nnot toml").unwrap();
        let config = Config::load(&path);
        assert_eq!(config.guard.min_lines_for_size_check, 10);
        assert!(dir.path().join("repairloop.toml.corrupt").exists());
    }

    #[test]
    fn test_validate_rejects_inverted_ratios() {
        let mut config = Config::default();
        config.guard.warn_size_shift_ratio = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "guard.warn_size_shift_ratio", .. })
        ));
        config = Config::default();
        config.protocol.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_enforces_retry_caps() {
        let mut config = Config::default();
        config.protocol.max_attempts = MAX_PROTOCOL_ATTEMPTS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "protocol.max_attempts", .. })
        ));

        let mut config = Config::default();
        config.guard.max_no_op_retries = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "guard.max_no_op_retries", .. })
        ));

        let mut config = Config::default();
        config.protocol.max_attempts = 1;
        config.guard.max_no_op_retries = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_prefers_explicit_runs() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_a");
        fs::create_dir_all(&run).unwrap();
        let mut config = Config::default();
        config.paths.runs = vec![run.clone()];
        assert_eq!(config.resolve_run_dirs_with(None, None).unwrap(), vec![run]);
    }

    #[test]
    fn test_resolve_env_runs_override_file() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("from_env");
        fs::create_dir_all(&run).unwrap();
        let mut config = Config::default();
        config.paths.runs = vec![dir.path().join("from_file")];
        let resolved = config
            .resolve_run_dirs_with(Some(run.clone().into_os_string()), None)
            .unwrap();
        assert_eq!(resolved, vec![run]);
    }

    #[test]
    fn test_resolve_falls_back_to_runs_root() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("run_1")).unwrap();
        let config = Config::default();
        let resolved = config
            .resolve_run_dirs_with(None, Some(dir.path().as_os_str().to_owned()))
            .unwrap();
        assert_eq!(resolved, vec![dir.path().join("run_1")]);
    }

    #[test]
    fn test_resolve_nothing_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            config.resolve_run_dirs_with(None, None),
            Err(ConfigError::NoInputDirectories)
        ));
    }
}
