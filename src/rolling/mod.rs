//! Rolling file management for a single stream directory.
//!
//! A [`RollingFileManager`] owns exactly one active file at a time. Files are
//! named from a [`FilenamePattern`]; when the rotation policy fires the active
//! file is closed, optionally compressed, and the directory is trimmed to the
//! configured reserve before a fresh file is opened. A [`DiskSpaceGuard`]
//! reclaims old files under disk pressure and suspends writes when free space
//! drops below the hard threshold.

mod naming;
mod policy;
mod retention;

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::clock::{age_at, Clock, SystemClock};
use crate::compression::{with_suffix, CompressionStrategy, GzipCompression};
use crate::disk::{DiskPolicy, DiskSpaceGuard, OldestFirst, ReclaimStrategy, SpaceProbe, StatvfsProbe};
use crate::{Error, Result};

pub use naming::{format_file_timestamp, FilenamePattern, MAX_SEQUENCE, SEQUENCE_TOKEN, TIMESTAMP_TOKEN};
pub use policy::{HybridRotationPolicy, RotationPolicy, SizeOnlyRotationPolicy};
pub use retention::enforce_reserve;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct RollingConfig {
    pub dir: PathBuf,
    pub pattern: String,
    pub max_bytes: u64,
    pub max_age: Duration,
    /// Number of most recent files kept by the post-rotation retention pass.
    pub reserve_n: usize,
    pub compress_on_rotate: bool,
    pub disk_policy: DiskPolicy,
}

/// Pluggable pieces of a [`RollingFileManager`].
#[derive(Clone)]
pub struct RollingStrategies {
    pub rotation: Arc<dyn RotationPolicy>,
    pub compression: Arc<dyn CompressionStrategy>,
    pub clock: Arc<dyn Clock>,
    pub space_probe: Arc<dyn SpaceProbe>,
    pub reclaim: Arc<dyn ReclaimStrategy>,
}

impl Default for RollingStrategies {
    fn default() -> Self {
        Self {
            rotation: Arc::new(HybridRotationPolicy),
            compression: Arc::new(GzipCompression::default()),
            clock: Arc::new(SystemClock),
            space_probe: Arc::new(StatvfsProbe),
            reclaim: Arc::new(OldestFirst),
        }
    }
}

pub struct RollingFileManager {
    dir: PathBuf,
    pattern: FilenamePattern,
    max_bytes: u64,
    max_age: Duration,
    reserve_n: usize,
    compress_on_rotate: bool,
    rotation: Arc<dyn RotationPolicy>,
    compression: Arc<dyn CompressionStrategy>,
    clock: Arc<dyn Clock>,
    guard: DiskSpaceGuard,
    current_path: PathBuf,
    writer: Option<BufWriter<File>>,
    created_at: SystemTime,
    suspended: bool,
    soft_failing: bool,
    rotations: u64,
}

impl RollingFileManager {
    pub fn open(config: RollingConfig) -> Result<Self> {
        Self::open_with(config, RollingStrategies::default())
    }

    /// Opens the directory, resuming the newest file when it is still under
    /// both ceilings, otherwise starting a new one.
    pub fn open_with(config: RollingConfig, strategies: RollingStrategies) -> Result<Self> {
        let pattern = FilenamePattern::new(config.pattern);
        pattern.validate()?;
        if config.reserve_n == 0 {
            return Err(Error::InvalidConfig("reserve_n must be >= 1".to_string()));
        }
        fs::create_dir_all(&config.dir)?;

        let mut guard = DiskSpaceGuard::new(
            config.dir.clone(),
            pattern.prefix(),
            pattern.extension(),
            strategies.compression.extension(),
            config.disk_policy,
        )
        .with_probe(strategies.space_probe);
        guard.set_reclaim_strategy(strategies.reclaim);

        let now = strategies.clock.now();
        let mut manager = Self {
            dir: config.dir,
            pattern,
            max_bytes: config.max_bytes,
            max_age: config.max_age,
            reserve_n: config.reserve_n,
            compress_on_rotate: config.compress_on_rotate,
            rotation: strategies.rotation,
            compression: strategies.compression,
            clock: strategies.clock,
            guard,
            current_path: PathBuf::new(),
            writer: None,
            created_at: now,
            suspended: false,
            soft_failing: false,
            rotations: 0,
        };

        match manager.find_appendable() {
            Some((path, modified)) => match manager.open_active(&path) {
                Ok(()) => {
                    manager.created_at = modified;
                    log::info!("resuming {}", path.display());
                }
                Err(err) => {
                    log::warn!("cannot resume {}: {err}; starting a new file", path.display());
                    manager.open_new_file()?;
                }
            },
            None => manager.open_new_file()?,
        }
        Ok(manager)
    }

    /// True when the active file is missing, unreadable, or the rotation
    /// policy fires for its current size and age.
    pub fn need_rotate(&self) -> bool {
        let Some(writer) = &self.writer else {
            return true;
        };
        let size = match fs::metadata(&self.current_path) {
            Ok(meta) => meta.len() + writer.buffer().len() as u64,
            Err(err) => {
                log::debug!("stat {} failed: {err}", self.current_path.display());
                return true;
            }
        };
        let age = age_at(self.clock.now(), self.created_at);
        self.rotation
            .should_rotate(size, age, self.max_bytes, self.max_age)
    }

    /// Closes the active file, compresses it if configured, applies the
    /// reserve, and opens a new file. Compression failure keeps the raw file.
    pub fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                log::warn!("flush of {} failed on rotate: {err}", self.current_path.display());
            }
        }
        self.guard.set_active_file(None);
        let closed = std::mem::take(&mut self.current_path);

        if self.compress_on_rotate && closed.is_file() {
            match self.compression.compress(&closed) {
                Ok(archived) => log::debug!("compressed {}", archived.display()),
                Err(err) => log::warn!("keeping {} uncompressed: {err}", closed.display()),
            }
        }

        let removed = enforce_reserve(&self.dir, self.reserve_n);
        if !removed.is_empty() {
            log::debug!(
                "retention removed {} file(s) from {}",
                removed.len(),
                self.dir.display()
            );
        }

        self.rotations += 1;
        self.open_new_file()
    }

    /// Checks the disk before a write.
    ///
    /// Hard pressure suspends writes. Otherwise old files are reclaimed down
    /// to the soft threshold; if that is unreachable the write is refused but
    /// the suspension flag is left alone. Transitions are logged once.
    pub fn ensure_writable(&mut self, _size_hint: usize) -> bool {
        if self.guard.hard_pressure() {
            if !self.suspended {
                log::error!(
                    "free space below hard threshold in {}; writes suspended",
                    self.dir.display()
                );
            }
            self.suspended = true;
            return false;
        }

        if !self.guard.ensure_soft() {
            if !self.soft_failing {
                log::warn!(
                    "free space below soft threshold in {} and nothing left to reclaim",
                    self.dir.display()
                );
            }
            self.soft_failing = true;
            return false;
        }
        self.soft_failing = false;

        if self.suspended {
            log::info!("disk pressure relieved in {}; writes resumed", self.dir.display());
        }
        self.suspended = false;
        true
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NoActiveFile)?;
        writer.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Newest file with the pattern's extension that is under both ceilings.
    fn find_appendable(&self) -> Option<(PathBuf, SystemTime)> {
        let extension = self.pattern.extension();
        let prefix = self.pattern.prefix();
        let suffix = self.compression.extension();
        let newest = fs::read_dir(&self.dir)
            .ok()?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if !name.starts_with(prefix) || !name.ends_with(extension) {
                    return None;
                }
                if name.ends_with(".tmp") || (!suffix.is_empty() && name.ends_with(suffix)) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some((entry.path(), meta.modified().ok()?, meta.len()))
            })
            .max_by_key(|(_, modified, _)| *modified)?;

        let (path, modified, size) = newest;
        let age = age_at(self.clock.now(), modified);
        if size < self.max_bytes && age < self.max_age {
            Some((path, modified))
        } else {
            None
        }
    }

    fn open_new_file(&mut self) -> Result<()> {
        let now = self.clock.now();
        let path = self.next_file_path(now);
        self.open_active(&path)?;
        self.created_at = now;
        log::debug!("opened {}", path.display());
        Ok(())
    }

    fn open_active(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.writer = Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));
        self.current_path = path.to_path_buf();
        self.guard.set_active_file(Some(path.to_path_buf()));
        Ok(())
    }

    /// First sequence whose raw and compressed names are both free; the last
    /// sequence number is reused when every slot is taken.
    fn next_file_path(&self, now: SystemTime) -> PathBuf {
        let suffix = self.compression.extension();
        for seq in 0..=MAX_SEQUENCE {
            let candidate = self.dir.join(self.pattern.render(now, seq));
            if !candidate.exists() && !with_suffix(&candidate, suffix).exists() {
                return candidate;
            }
        }
        log::warn!(
            "all sequence numbers taken for {} in {}",
            self.pattern.as_str(),
            self.dir.display()
        );
        self.dir.join(self.pattern.render(now, MAX_SEQUENCE))
    }
}

impl Drop for RollingFileManager {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("flush of {} failed on close: {err}", self.current_path.display());
        }
    }
}
