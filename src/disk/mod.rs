//! Free-space policing for a stream directory.
//!
//! The guard keeps a directory above a soft free-space threshold by deleting
//! old managed files, and reports hard pressure when free space falls below
//! a second, lower threshold. Files are split into two candidate buckets:
//!
//! - compressed: `<prefix>*<ext><compressed_suffix>` (deleted first)
//! - raw: `<prefix>*<ext>`
//!
//! Deletion never brings the managed file count below `min_keep_files`, and
//! the file currently being written is never a candidate.

mod probe;
mod reclaim;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use probe::{SpaceProbe, StatvfsProbe};
pub use reclaim::{LargestFirst, OldestFirst, ReclaimStrategy};

const DEFAULT_SOFT_MIN_FREE: u64 = 100 * 1024 * 1024;
const DEFAULT_HARD_MIN_FREE: u64 = 50 * 1024 * 1024;
const DEFAULT_MIN_KEEP_FILES: usize = 2;

/// Free-space thresholds for a stream directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskPolicy {
    /// Reclaim old files until at least this many bytes are free.
    pub soft_min_free_bytes: u64,
    /// Below this many free bytes, writes are suspended.
    pub hard_min_free_bytes: u64,
    /// Reclamation never leaves fewer managed files than this.
    pub min_keep_files: usize,
}

impl Default for DiskPolicy {
    fn default() -> Self {
        Self {
            soft_min_free_bytes: DEFAULT_SOFT_MIN_FREE,
            hard_min_free_bytes: DEFAULT_HARD_MIN_FREE,
            min_keep_files: DEFAULT_MIN_KEEP_FILES,
        }
    }
}

impl DiskPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.hard_min_free_bytes == 0 {
            return Err(Error::InvalidConfig(
                "hard_min_free_bytes must be > 0".to_string(),
            ));
        }
        if self.soft_min_free_bytes <= self.hard_min_free_bytes {
            return Err(Error::InvalidConfig(format!(
                "soft_min_free_bytes ({}) must exceed hard_min_free_bytes ({})",
                self.soft_min_free_bytes, self.hard_min_free_bytes
            )));
        }
        if self.min_keep_files == 0 {
            return Err(Error::InvalidConfig(
                "min_keep_files must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A file the guard may reclaim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

type ReclaimCallback = Arc<dyn Fn(&Path) + Send + Sync>;

pub struct DiskSpaceGuard {
    dir: PathBuf,
    prefix: String,
    extension: String,
    compressed_suffix: String,
    policy: DiskPolicy,
    active: Option<PathBuf>,
    probe: Arc<dyn SpaceProbe>,
    strategy: Arc<dyn ReclaimStrategy>,
    on_reclaim: Option<ReclaimCallback>,
}

impl DiskSpaceGuard {
    /// Creates a guard using `statvfs` and oldest-first reclamation.
    ///
    /// * `prefix` - only names starting with this are managed (empty: all)
    /// * `extension` - raw file extension including the dot, e.g. `.txt`
    /// * `compressed_suffix` - appended by compression, e.g. `.gz`
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
        compressed_suffix: impl Into<String>,
        policy: DiskPolicy,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
            compressed_suffix: compressed_suffix.into(),
            policy,
            active: None,
            probe: Arc::new(StatvfsProbe),
            strategy: Arc::new(OldestFirst),
            on_reclaim: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn set_policy(&mut self, policy: DiskPolicy) {
        self.policy = policy;
    }

    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dir = dir.into();
    }

    pub fn set_reclaim_strategy(&mut self, strategy: Arc<dyn ReclaimStrategy>) {
        self.strategy = strategy;
    }

    /// Invoked with the path of every file the guard deletes.
    pub fn set_on_reclaim<F>(&mut self, callback: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.on_reclaim = Some(Arc::new(callback));
    }

    /// Marks the file currently being written; it is never reclaimed.
    pub fn set_active_file(&mut self, path: Option<PathBuf>) {
        self.active = path;
    }

    pub fn policy(&self) -> &DiskPolicy {
        &self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Free bytes under the directory; a failed query counts as zero.
    pub fn available_bytes(&self) -> u64 {
        match self.probe.available_bytes(&self.dir) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::debug!("free space query failed for {}: {err}", self.dir.display());
                0
            }
        }
    }

    pub fn hard_pressure(&self) -> bool {
        self.available_bytes() < self.policy.hard_min_free_bytes
    }

    /// Ensures free space is at or above the soft threshold, reclaiming old
    /// files if needed. Returns whether the threshold holds afterwards.
    pub fn ensure_soft(&self) -> bool {
        if self.soft_satisfied() {
            return true;
        }
        self.reclaim_until_soft();
        self.soft_satisfied()
    }

    pub fn managed_file_count(&self) -> usize {
        let (compressed, raw, active) = self.collect_candidates();
        compressed.len() + raw.len() + usize::from(active)
    }

    fn soft_satisfied(&self) -> bool {
        self.available_bytes() >= self.policy.soft_min_free_bytes
    }

    fn reclaim_until_soft(&self) {
        let (compressed, raw, active) = self.collect_candidates();
        let total = compressed.len() + raw.len() + usize::from(active);
        let keep = self.policy.min_keep_files;
        if total <= keep {
            return;
        }
        let mut quota = total - keep;

        for bucket in [&compressed, &raw] {
            if quota == 0 || self.soft_satisfied() {
                break;
            }
            let picked = self.strategy.select(bucket, quota.min(bucket.len()));
            for file in picked {
                if quota == 0 || self.soft_satisfied() {
                    break;
                }
                if self.try_remove(&file.path) {
                    quota -= 1;
                }
            }
        }
    }

    fn try_remove(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                log::info!("reclaimed {} to free disk space", path.display());
                if let Some(callback) = &self.on_reclaim {
                    callback(path);
                }
                true
            }
            Err(err) => {
                log::warn!("failed to remove {}: {err}", path.display());
                false
            }
        }
    }

    /// Returns (compressed, raw, active_present), buckets sorted oldest first.
    fn collect_candidates(&self) -> (Vec<ManagedFile>, Vec<ManagedFile>, bool) {
        let mut compressed = Vec::new();
        let mut raw = Vec::new();
        let mut active_present = false;

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("cannot list {}: {err}", self.dir.display());
                return (compressed, raw, false);
            }
        };

        let compressed_tail = format!("{}{}", self.extension, self.compressed_suffix);
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !self.prefix.is_empty() && !name.starts_with(&self.prefix) {
                continue;
            }
            let is_compressed =
                !self.compressed_suffix.is_empty() && name.ends_with(&compressed_tail);
            let is_raw = !is_compressed
                && (self.extension.is_empty() || name.ends_with(&self.extension))
                && (self.compressed_suffix.is_empty() || !name.ends_with(&self.compressed_suffix));
            if !is_compressed && !is_raw {
                continue;
            }
            if self.active.as_deref() == Some(path.as_path()) {
                active_present = true;
                continue;
            }
            let file = ManagedFile {
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
                size: meta.len(),
                path,
            };
            if is_compressed {
                compressed.push(file);
            } else {
                raw.push(file);
            }
        }

        compressed.sort_by_key(|file| file.modified);
        raw.sort_by_key(|file| file.modified);
        (compressed, raw, active_present)
    }
}
