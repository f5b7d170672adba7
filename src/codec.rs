//! On-disk record formats.
//!
//! Binary and message streams append one length-prefixed record per write,
//! little-endian:
//!
//! ```text
//! u64 timestamp
//! u32 tag_len   | u32 topic_len
//! tag bytes     | topic bytes
//!               | u32 type_len
//!               | type bytes
//! u32 data_len
//! data bytes
//! ```
//!
//! Text streams hold one line per record:
//! `<timestamp> <LEVEL> <file>:<line> <function> - <message>`. The
//! timestamp is UTC, matching the stream file names.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use time::OffsetDateTime;

use crate::record::{BinaryRecord, LogRecord, MessageRecord, RecordKind, TextRecord};
use crate::{Error, Result};

/// Upper bound accepted for a single decoded field. Guards against
/// allocating from a corrupt length prefix.
pub const MAX_FIELD_LEN: usize = 256 * 1024 * 1024;

fn len_prefix(len: usize) -> Result<[u8; 4]> {
    let len = u32::try_from(len).map_err(|_| Error::RecordTooLarge(len))?;
    Ok(len.to_le_bytes())
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    out.extend_from_slice(&len_prefix(bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Appends the encoded binary record to `out`.
pub fn encode_binary(record: &BinaryRecord, out: &mut Vec<u8>) -> Result<()> {
    out.reserve(8 + 4 + record.tag.len() + 4 + record.payload.len());
    out.extend_from_slice(&record.timestamp.to_le_bytes());
    put_field(out, record.tag.as_bytes())?;
    put_field(out, &record.payload)
}

/// Appends the encoded message record to `out`.
pub fn encode_message(record: &MessageRecord, out: &mut Vec<u8>) -> Result<()> {
    out.reserve(
        8 + 4 + record.topic.len() + 4 + record.msg_type.len() + 4 + record.payload.len(),
    );
    out.extend_from_slice(&record.timestamp.to_le_bytes());
    put_field(out, record.topic.as_bytes())?;
    put_field(out, record.msg_type.as_bytes())?;
    put_field(out, &record.payload)
}

/// Appends the newline-terminated text line for `record` to `out`.
pub fn encode_text(record: &TextRecord, out: &mut Vec<u8>) {
    let line = format!(
        "{} {} {}:{} {} - {}\n",
        format_timestamp_micros(record.timestamp),
        record.level,
        record.file,
        record.line,
        record.function,
        record.message
    );
    out.extend_from_slice(line.as_bytes());
}

/// Renders microseconds since the epoch as `YYYY-MM-DD HH:MM:SS.mmm` (UTC).
pub fn format_timestamp_micros(timestamp: u64) -> String {
    match OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp) * 1_000) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            dt.year(),
            dt.month() as u8,
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.millisecond()
        ),
        Err(_) => timestamp.to_string(),
    }
}

/// Fills `buf` completely, or reports a clean EOF if nothing was read.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    if filled == 0 {
        return Ok(false);
    }
    if filled < buf.len() {
        return Err(Error::Corrupt("truncated record header"));
    }
    Ok(true)
}

fn read_exact_body<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::Corrupt("truncated record body"),
        _ => Error::Io(err),
    })
}

fn read_field<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    read_exact_body(reader, &mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FIELD_LEN {
        return Err(Error::Corrupt("field length exceeds limit"));
    }
    let mut bytes = vec![0u8; len];
    read_exact_body(reader, &mut bytes)?;
    Ok(bytes)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    String::from_utf8(read_field(reader)?).map_err(|_| Error::Corrupt("field is not utf-8"))
}

fn read_timestamp<R: Read>(reader: &mut R) -> Result<Option<u64>> {
    let mut ts = [0u8; 8];
    if !fill_or_eof(reader, &mut ts)? {
        return Ok(None);
    }
    Ok(Some(u64::from_le_bytes(ts)))
}

pub fn decode_binary<R: Read>(reader: &mut R) -> Result<Option<BinaryRecord>> {
    let Some(timestamp) = read_timestamp(reader)? else {
        return Ok(None);
    };
    let tag = read_string(reader)?;
    let payload = read_field(reader)?;
    Ok(Some(BinaryRecord {
        tag,
        payload,
        timestamp,
    }))
}

pub fn decode_message<R: Read>(reader: &mut R) -> Result<Option<MessageRecord>> {
    let Some(timestamp) = read_timestamp(reader)? else {
        return Ok(None);
    };
    let topic = read_string(reader)?;
    let msg_type = read_string(reader)?;
    let payload = read_field(reader)?;
    Ok(Some(MessageRecord {
        topic,
        msg_type,
        payload,
        timestamp,
    }))
}

/// Sequential reader over a binary or message stream.
///
/// Iteration stops at the first clean EOF. A partially written trailing
/// record (crash while appending) yields a single `Corrupt` error.
pub struct RecordReader<R> {
    inner: R,
    kind: RecordKind,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// `kind` must be `Binary` or `Message`; text streams are line-oriented.
    pub fn new(inner: R, kind: RecordKind) -> Result<Self> {
        if kind == RecordKind::Text {
            return Err(Error::InvalidConfig(
                "text streams are read line by line".to_string(),
            ));
        }
        Ok(Self {
            inner,
            kind,
            done: false,
        })
    }

    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        if self.done {
            return Ok(None);
        }
        let record = match self.kind {
            RecordKind::Binary => decode_binary(&mut self.inner).map(|r| r.map(LogRecord::Binary)),
            RecordKind::Message => {
                decode_message(&mut self.inner).map(|r| r.map(LogRecord::Message))
            }
            RecordKind::Text => Ok(None),
        };
        if !matches!(record, Ok(Some(_))) {
            self.done = true;
        }
        record
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Opens a stream file for reading, decompressing rotated archives by suffix.
pub fn open_stream_file(path: impl AsRef<Path>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if name.ends_with(".gz") {
        return Ok(Box::new(GzDecoder::new(BufReader::new(file))));
    }
    if name.ends_with(".zst") {
        return zstd_reader(file);
    }
    Ok(Box::new(BufReader::new(file)))
}

#[cfg(feature = "zstd")]
fn zstd_reader(file: File) -> Result<Box<dyn Read>> {
    Ok(Box::new(zstd::stream::read::Decoder::new(file)?))
}

#[cfg(not(feature = "zstd"))]
fn zstd_reader(_file: File) -> Result<Box<dyn Read>> {
    Err(Error::InvalidConfig(
        "zstd support not compiled in".to_string(),
    ))
}
