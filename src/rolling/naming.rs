//! Filename patterns for stream files.
//!
//! Timestamps in file names are rendered in UTC, not the host's local time
//! zone, so names sort the same on every machine and across DST changes.

use std::time::SystemTime;

use time::OffsetDateTime;

use crate::{Error, Result};

/// Replaced by the file's creation time, `YYYYMMDD_HHMMSS` (UTC).
pub const TIMESTAMP_TOKEN: &str = "%Y%m%d_%H%M%S";
/// Replaced by the zero-padded 3-digit sequence number.
pub const SEQUENCE_TOKEN: &str = "%03d";
/// Highest sequence number probed when choosing a new file name.
pub const MAX_SEQUENCE: u32 = 999;

/// A file name template such as `log_%Y%m%d_%H%M%S_%03d.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    raw: String,
}

impl FilenamePattern {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn validate(&self) -> Result<()> {
        if self.raw.is_empty() {
            return Err(Error::InvalidConfig("filename pattern is empty".to_string()));
        }
        if self.raw.contains('/') || self.raw.contains('\\') {
            return Err(Error::InvalidConfig(format!(
                "filename pattern must not contain path separators: {}",
                self.raw
            )));
        }
        if !self.raw.contains(SEQUENCE_TOKEN) {
            return Err(Error::InvalidConfig(format!(
                "filename pattern must contain {SEQUENCE_TOKEN}: {}",
                self.raw
            )));
        }
        Ok(())
    }

    /// Substitutes the first occurrence of each token.
    pub fn render(&self, at: SystemTime, seq: u32) -> String {
        let mut name = self.raw.clone();
        if let Some(pos) = name.find(TIMESTAMP_TOKEN) {
            name.replace_range(pos..pos + TIMESTAMP_TOKEN.len(), &format_file_timestamp(at));
        }
        if let Some(pos) = name.find(SEQUENCE_TOKEN) {
            name.replace_range(pos..pos + SEQUENCE_TOKEN.len(), &format!("{seq:03}"));
        }
        name
    }

    /// The raw file extension including the dot (`.txt`), or empty.
    pub fn extension(&self) -> &str {
        match self.raw.rfind('.') {
            Some(pos) if !self.raw[pos..].contains('%') => &self.raw[pos..],
            _ => "",
        }
    }

    /// The literal text before the first token.
    pub fn prefix(&self) -> &str {
        match self.raw.find('%') {
            Some(pos) => &self.raw[..pos],
            None => "",
        }
    }
}

/// `YYYYMMDD_HHMMSS` in UTC.
pub fn format_file_timestamp(at: SystemTime) -> String {
    let dt = OffsetDateTime::from(at);
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}
