//! Record types accepted by the sinks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Severity of a text record. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(Error::InvalidConfig(format!("unknown log level: {other}"))),
        }
    }
}

/// Which sink a record is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Text,
    Binary,
    #[serde(alias = "bag")]
    Message,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Text => "text",
            RecordKind::Binary => "binary",
            RecordKind::Message => "message",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub level: LogLevel,
    pub message: String,
    pub file: String,
    pub function: String,
    /// Microseconds since the UNIX epoch.
    pub timestamp: u64,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    pub tag: String,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub topic: String,
    pub msg_type: String,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Text(TextRecord),
    Binary(BinaryRecord),
    Message(MessageRecord),
}

impl LogRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            LogRecord::Text(_) => RecordKind::Text,
            LogRecord::Binary(_) => RecordKind::Binary,
            LogRecord::Message(_) => RecordKind::Message,
        }
    }

    /// Rough on-disk footprint, used as the space-pressure hint.
    pub fn estimated_size(&self) -> usize {
        match self {
            LogRecord::Text(r) => r.message.len() + 128,
            LogRecord::Binary(r) => r.payload.len() + r.tag.len() + 16,
            LogRecord::Message(r) => r.payload.len() + r.topic.len() + r.msg_type.len() + 16,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            LogRecord::Text(r) => r.timestamp,
            LogRecord::Binary(r) => r.timestamp,
            LogRecord::Message(r) => r.timestamp,
        }
    }
}

impl From<TextRecord> for LogRecord {
    fn from(value: TextRecord) -> Self {
        LogRecord::Text(value)
    }
}

impl From<BinaryRecord> for LogRecord {
    fn from(value: BinaryRecord) -> Self {
        LogRecord::Binary(value)
    }
}

impl From<MessageRecord> for LogRecord {
    fn from(value: MessageRecord) -> Self {
        LogRecord::Message(value)
    }
}
