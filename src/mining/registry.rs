//! Persisted set of preference pairs already emitted.
//!
//! The file is a JSON array of key tuples:
//!
//! ```text
//! [7, "run_a", 2, "run_a", 1]   mined: code_id, best run/iter, worst run/iter
//! ["manual", 11]                manual golden pair
//! [7, 2, 1]                     legacy: code_id, best iter, worst iter
//! ```
//!
//! Entries in any other shape are carried through untouched.

use anyhow::Context;
use fs2::FileExt;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::util::{read_optional, write_atomic};

const REGISTRY_LOCK_TIMEOUT_SECS: u64 = 30;
const REGISTRY_LOCK_RETRY_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PairKey {
    Mined {
        code_id: u32,
        best_run: String,
        best_iteration: u32,
        worst_run: String,
        worst_iteration: u32,
    },
    Manual {
        code_id: u32,
    },
    Legacy {
        code_id: u32,
        best_iteration: u32,
        worst_iteration: u32,
    },
}

impl PairKey {
    /// The three-field identity older registries stored for a mined pair.
    pub fn legacy_projection(&self) -> Option<PairKey> {
        match self {
            PairKey::Mined {
                code_id,
                best_iteration,
                worst_iteration,
                ..
            } => Some(PairKey::Legacy {
                code_id: *code_id,
                best_iteration: *best_iteration,
                worst_iteration: *worst_iteration,
            }),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PairKey::Mined {
                code_id,
                best_run,
                best_iteration,
                worst_run,
                worst_iteration,
            } => json!([code_id, best_run, best_iteration, worst_run, worst_iteration]),
            PairKey::Manual { code_id } => json!(["manual", code_id]),
            PairKey::Legacy {
                code_id,
                best_iteration,
                worst_iteration,
            } => json!([code_id, best_iteration, worst_iteration]),
        }
    }

    pub fn from_json(value: &Value) -> Option<PairKey> {
        let items = value.as_array()?;
        let num = |idx: usize| -> Option<u32> {
            items.get(idx)?.as_u64().and_then(|n| u32::try_from(n).ok())
        };
        let text = |idx: usize| -> Option<String> { items.get(idx)?.as_str().map(str::to_string) };

        match items.len() {
            5 => Some(PairKey::Mined {
                code_id: num(0)?,
                best_run: text(1)?,
                best_iteration: num(2)?,
                worst_run: text(3)?,
                worst_iteration: num(4)?,
            }),
            3 => Some(PairKey::Legacy {
                code_id: num(0)?,
                best_iteration: num(1)?,
                worst_iteration: num(2)?,
            }),
            2 if text(0).as_deref() == Some("manual") => Some(PairKey::Manual { code_id: num(1)? }),
            2 if text(1).as_deref() == Some("manual") => Some(PairKey::Manual { code_id: num(0)? }),
            _ => None,
        }
    }
}

/// Exclusive advisory lock held for the duration of a mining session.
#[derive(Debug)]
pub struct RegistryLock {
    file: fs::File,
}

impl RegistryLock {
    pub fn acquire(registry_path: &Path) -> anyhow::Result<Self> {
        let lock_path = lock_path(registry_path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file '{}'", lock_path.display()))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= Duration::from_secs(REGISTRY_LOCK_TIMEOUT_SECS) {
                        return Err(anyhow::anyhow!(
                            "Timed out waiting for registry lock '{}' ({}s)",
                            lock_path.display(),
                            REGISTRY_LOCK_TIMEOUT_SECS
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(REGISTRY_LOCK_RETRY_MS));
                }
            }
        }
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(registry_path: &Path) -> PathBuf {
    let mut name = registry_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[derive(Debug)]
pub struct SeenPairRegistry {
    path: PathBuf,
    keys: BTreeSet<PairKey>,
    unknown: Vec<Value>,
    _lock: Option<RegistryLock>,
}

impl SeenPairRegistry {
    /// Read the registry without locking. A missing file is an empty registry.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let (keys, unknown) = read_keys(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            keys,
            unknown,
            _lock: None,
        })
    }

    /// Take the exclusive lock, then load. The lock is released on drop.
    pub fn open_locked(path: &Path) -> anyhow::Result<Self> {
        let lock = RegistryLock::acquire(path)?;
        let mut registry = Self::load(path)?;
        registry._lock = Some(lock);
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seen either as-is or, for mined keys, under the legacy projection.
    pub fn contains(&self, key: &PairKey) -> bool {
        self.keys.contains(key)
            || key
                .legacy_projection()
                .is_some_and(|legacy| self.keys.contains(&legacy))
    }

    /// Returns whether the key was new.
    pub fn add(&mut self, key: PairKey) -> bool {
        self.keys.insert(key)
    }

    /// Merge with whatever is on disk now (set union) and write atomically.
    /// Returns the persisted entry count.
    pub fn persist(&mut self) -> anyhow::Result<usize> {
        let (on_disk, unknown_on_disk) = read_keys(&self.path)?;
        self.keys.extend(on_disk);
        for value in unknown_on_disk {
            if !self.unknown.contains(&value) {
                self.unknown.push(value);
            }
        }

        let entries: Vec<Value> = self
            .keys
            .iter()
            .map(PairKey::to_json)
            .chain(self.unknown.iter().cloned())
            .collect();
        let content = serde_json::to_string(&entries)?;
        write_atomic(&self.path, &content)?;
        Ok(entries.len())
    }
}

fn read_keys(path: &Path) -> anyhow::Result<(BTreeSet<PairKey>, Vec<Value>)> {
    let Some(content) = read_optional(path)? else {
        return Ok((BTreeSet::new(), Vec::new()));
    };
    if content.trim().is_empty() {
        return Ok((BTreeSet::new(), Vec::new()));
    }
    let values: Vec<Value> = match serde_json::from_str(&content) {
        Ok(Value::Array(values)) => values,
        Ok(_) | Err(_) => {
            tracing::warn!(path = %path.display(), "seen-pair registry is not a JSON array, starting empty");
            return Ok((BTreeSet::new(), Vec::new()));
        }
    };

    let mut keys = BTreeSet::new();
    let mut unknown = Vec::new();
    for value in values {
        match PairKey::from_json(&value) {
            Some(key) => {
                keys.insert(key);
            }
            None => unknown.push(value),
        }
    }
    Ok((keys, unknown))
}
