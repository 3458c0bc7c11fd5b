//! Hand-curated golden pairs under `<manual_dir>/code_<id>/`.
//!
//! Each folder holds `chosen.c` and a rejected side (`rejected.c`, else
//! `current.c`). `repair_instructions.txt` is optional.

use anyhow::Context;
use std::fs;
use std::path::Path;

use super::health::check_health;
use super::PreferencePair;
use crate::config::HealthConfig;
use crate::layout::parse_code_id;
use crate::prompts::{fixer_prompt, DEFAULT_INSTRUCTIONS};
use crate::util::read_non_empty;

#[derive(Debug, Default)]
pub struct ManualPairs {
    pub pairs: Vec<PreferencePair>,
    pub incomplete: usize,
    pub rejected_by_health: usize,
}

/// A missing directory yields no pairs.
pub fn collect_manual_pairs(dir: &Path, health: &HealthConfig) -> anyhow::Result<ManualPairs> {
    let mut out = ManualPairs::default();
    if !dir.is_dir() {
        return Ok(out);
    }

    let mut folders: Vec<(u32, std::path::PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list '{}'", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let id = parse_code_id(entry.file_name().to_str()?)?;
            Some((id, entry.path()))
        })
        .collect();
    folders.sort();

    for (code_id, folder) in folders {
        let chosen = read_non_empty(&folder.join("chosen.c"))?;
        let rejected = match read_non_empty(&folder.join("rejected.c"))? {
            Some(text) => Some(text),
            None => read_non_empty(&folder.join("current.c"))?,
        };
        let (Some(chosen), Some(rejected)) = (chosen, rejected) else {
            tracing::debug!(code_id, folder = %folder.display(), "manual pair incomplete");
            out.incomplete += 1;
            continue;
        };

        let baseline = read_non_empty(&folder.join("current.c"))?.unwrap_or_else(|| rejected.clone());
        let instructions = read_non_empty(&folder.join("repair_instructions.txt"))?
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());

        if let Err(violation) = check_health(&baseline, &chosen, health) {
            tracing::info!(code_id, reason = %violation, "manual pair rejected by health filter");
            out.rejected_by_health += 1;
            continue;
        }

        out.pairs.push(PreferencePair {
            prompt: fixer_prompt(&baseline, &instructions),
            chosen,
            rejected,
            code_id,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::attempt::fixtures::PROGRAM;
    use tempfile::tempdir;

    #[test]
    fn test_current_stands_in_for_rejected() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("code_11");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("current.c"), PROGRAM).unwrap();
        fs::write(folder.join("chosen.c"), PROGRAM.replace("1, 2", "2, 3")).unwrap();

        let manual = collect_manual_pairs(dir.path(), &HealthConfig::default()).unwrap();
        assert_eq!(manual.pairs.len(), 1);
        let pair = &manual.pairs[0];
        assert_eq!(pair.code_id, 11);
        assert_eq!(pair.rejected, PROGRAM);
        assert!(pair.prompt.contains(DEFAULT_INSTRUCTIONS));
    }

    #[test]
    fn test_instructions_and_rejected_file_used() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("code_2");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("rejected.c"), "int main() { return 1 }\n").unwrap();
        fs::write(folder.join("chosen.c"), "int main() { return 0; }\n").unwrap();
        fs::write(folder.join("repair_instructions.txt"), "TYPE FIX:\n(none)\n").unwrap();

        let manual = collect_manual_pairs(dir.path(), &HealthConfig::default()).unwrap();
        assert_eq!(manual.pairs.len(), 1);
        assert!(manual.pairs[0].prompt.contains("CURRENT CODE:\nint main() { return 1 }"));
        assert!(manual.pairs[0].prompt.contains("REPAIR INSTRUCTIONS:\nTYPE FIX:\n(none)\n\n"));
    }

    #[test]
    fn test_incomplete_and_missing_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("code_5")).unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        let manual = collect_manual_pairs(dir.path(), &HealthConfig::default()).unwrap();
        assert!(manual.pairs.is_empty());
        assert_eq!(manual.incomplete, 1);

        let none = collect_manual_pairs(&dir.path().join("absent"), &HealthConfig::default()).unwrap();
        assert!(none.pairs.is_empty());
    }
}
