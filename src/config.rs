//! JSON configuration for a [`Logger`](crate::Logger).
//!
//! ```json
//! {
//!   "base_dir": "./logs",
//!   "log_level": "INFO",
//!   "async_mode": true,
//!   "async_queue_size": 10000,
//!   "modules": [
//!     { "name": "text", "pattern": "log_%Y%m%d_%H%M%S_%03d.txt",
//!       "max_bytes_mb": 1, "max_age_minutes": 60, "reserve_n": 8, "compress_old": true }
//!   ]
//! }
//! ```
//!
//! Every field is optional. A missing `modules` key yields the three default
//! streams (`text`, `binary`, `bag`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compression::CompressionCodec;
use crate::disk::DiskPolicy;
use crate::record::{LogLevel, RecordKind};
use crate::rolling::FilenamePattern;
use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;
const DEFAULT_QUEUE_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub base_dir: PathBuf,
    /// Subdirectory under `base_dir`; defaults to the executable's file stem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    pub log_level: LogLevel,
    pub async_mode: bool,
    pub async_queue_size: usize,
    /// Copy formatted text records to stdout.
    pub console_echo: bool,
    pub disk: DiskPolicy,
    pub modules: Vec<ModuleConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./logs"),
            process_name: None,
            log_level: LogLevel::Info,
            async_mode: true,
            async_queue_size: DEFAULT_QUEUE_SIZE,
            console_echo: false,
            disk: DiskPolicy::default(),
            modules: ModuleConfig::defaults(),
        }
    }
}

impl LoggerConfig {
    /// Default config rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.async_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "async_queue_size must be >= 1".to_string(),
            ));
        }
        if let Some(name) = &self.process_name {
            validate_dir_name("process_name", name)?;
        }
        self.disk.validate()?;
        for (i, module) in self.modules.iter().enumerate() {
            module.validate()?;
            if self.modules[..i].iter().any(|m| m.name == module.name) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate module name: {}",
                    module.name
                )));
            }
        }
        Ok(())
    }

    pub fn find_module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// `<base_dir>/<process_name>`.
    pub fn process_dir(&self) -> PathBuf {
        let name = match &self.process_name {
            Some(name) => name.clone(),
            None => current_process_name(),
        };
        self.base_dir.join(name)
    }
}

fn current_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "process".to_string())
}

fn validate_dir_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::InvalidConfig(format!(
            "{field} must be a plain directory name: {name:?}"
        )));
    }
    Ok(())
}

/// One output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModuleConfigRepr")]
pub struct ModuleConfig {
    pub name: String,
    /// Record kind; inferred from `name` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RecordKind>,
    pub pattern: String,
    pub max_bytes: u64,
    pub max_age_minutes: u64,
    pub reserve_n: usize,
    pub compress_old: bool,
    pub compression: CompressionCodec,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            pattern: pattern.into(),
            max_bytes: MIB,
            max_age_minutes: 60,
            reserve_n: 8,
            compress_old: true,
            compression: CompressionCodec::default(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("text", "log_%Y%m%d_%H%M%S_%03d.txt"),
            Self {
                max_bytes: 5 * MIB,
                max_age_minutes: 120,
                reserve_n: 5,
                ..Self::new("binary", "binary_%Y%m%d_%H%M%S_%03d.bin")
            },
            Self {
                max_bytes: 10 * MIB,
                max_age_minutes: 180,
                reserve_n: 3,
                ..Self::new("bag", "messages_%Y%m%d_%H%M%S_%03d.bag")
            },
        ]
    }

    pub fn kind(&self) -> RecordKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        match self.name.as_str() {
            "binary" => RecordKind::Binary,
            "bag" | "message" | "messages" => RecordKind::Message,
            _ => RecordKind::Text,
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_minutes.saturating_mul(60))
    }

    pub fn validate(&self) -> Result<()> {
        validate_dir_name("module name", &self.name)?;
        FilenamePattern::new(self.pattern.as_str()).validate()?;
        if self.max_bytes == 0 {
            return Err(Error::InvalidConfig(format!(
                "module {}: max_bytes must be > 0",
                self.name
            )));
        }
        if self.max_age_minutes == 0 {
            return Err(Error::InvalidConfig(format!(
                "module {}: max_age_minutes must be > 0",
                self.name
            )));
        }
        if self.reserve_n == 0 {
            return Err(Error::InvalidConfig(format!(
                "module {}: reserve_n must be >= 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Accepts `max_bytes` or the older `max_bytes_mb`; `max_bytes` wins.
#[derive(Deserialize)]
#[serde(default)]
struct ModuleConfigRepr {
    name: String,
    kind: Option<RecordKind>,
    pattern: String,
    max_bytes: Option<u64>,
    max_bytes_mb: Option<u64>,
    max_age_minutes: u64,
    reserve_n: usize,
    #[serde(alias = "compress_on_rotate")]
    compress_old: bool,
    compression: CompressionCodec,
}

impl Default for ModuleConfigRepr {
    fn default() -> Self {
        let base = ModuleConfig::new("default", "log_%Y%m%d_%H%M%S_%03d.txt");
        Self {
            name: base.name,
            kind: None,
            pattern: base.pattern,
            max_bytes: None,
            max_bytes_mb: None,
            max_age_minutes: base.max_age_minutes,
            reserve_n: base.reserve_n,
            compress_old: base.compress_old,
            compression: base.compression,
        }
    }
}

impl From<ModuleConfigRepr> for ModuleConfig {
    fn from(repr: ModuleConfigRepr) -> Self {
        let max_bytes = repr
            .max_bytes
            .or_else(|| repr.max_bytes_mb.map(|mb| mb.saturating_mul(MIB)))
            .unwrap_or(MIB);
        Self {
            name: repr.name,
            kind: repr.kind,
            pattern: repr.pattern,
            max_bytes,
            max_age_minutes: repr.max_age_minutes,
            reserve_n: repr.reserve_n,
            compress_old: repr.compress_old,
            compression: repr.compression,
        }
    }
}
