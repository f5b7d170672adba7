//! Process-local rolling file logging.
//!
//! Text, binary and structured-message records are written to per-stream
//! directories of size- and age-bounded files. Closed files are compressed
//! and trimmed to a reserve, a disk guard reclaims old files when free space
//! runs low, and an optional bounded queue moves all file I/O onto a single
//! consumer thread.

pub mod clock;
pub mod codec;
pub mod compression;
pub mod config;
pub mod disk;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod record;
pub mod rolling;
pub mod sink;
pub mod warn;

pub use config::{LoggerConfig, ModuleConfig};
pub use error::{Error, Result};
pub use logger::Logger;
pub use record::{BinaryRecord, LogLevel, LogRecord, MessageRecord, RecordKind, TextRecord};
