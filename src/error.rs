use thiserror::Error;

use crate::record::RecordKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    #[error("record field too large: {0} bytes")]
    RecordTooLarge(usize),
    #[error("sink accepts {expected} records, got {actual}")]
    KindMismatch {
        expected: RecordKind,
        actual: RecordKind,
    },
    #[error("compression failed for {path}: {reason}")]
    Compression { path: String, reason: String },
    #[error("no active file")]
    NoActiveFile,
}

pub type Result<T> = std::result::Result<T, Error>;
