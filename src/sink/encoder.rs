use crate::codec::{encode_binary, encode_message, encode_text};
use crate::record::{LogRecord, RecordKind};
use crate::{Error, Result};

/// Serializes one record kind into its on-disk bytes.
pub trait RecordEncoder: Send + Sync + 'static {
    fn kind(&self) -> RecordKind;

    /// Appends the encoding of `record` to `out`. Records of another kind
    /// fail with [`Error::KindMismatch`].
    fn encode(&self, record: &LogRecord, out: &mut Vec<u8>) -> Result<()>;
}

fn mismatch(expected: RecordKind, record: &LogRecord) -> Error {
    Error::KindMismatch {
        expected,
        actual: record.kind(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder;

impl RecordEncoder for TextEncoder {
    fn kind(&self) -> RecordKind {
        RecordKind::Text
    }

    fn encode(&self, record: &LogRecord, out: &mut Vec<u8>) -> Result<()> {
        match record {
            LogRecord::Text(text) => {
                encode_text(text, out);
                Ok(())
            }
            other => Err(mismatch(RecordKind::Text, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncoder;

impl RecordEncoder for BinaryEncoder {
    fn kind(&self) -> RecordKind {
        RecordKind::Binary
    }

    fn encode(&self, record: &LogRecord, out: &mut Vec<u8>) -> Result<()> {
        match record {
            LogRecord::Binary(binary) => encode_binary(binary, out),
            other => Err(mismatch(RecordKind::Binary, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEncoder;

impl RecordEncoder for MessageEncoder {
    fn kind(&self) -> RecordKind {
        RecordKind::Message
    }

    fn encode(&self, record: &LogRecord, out: &mut Vec<u8>) -> Result<()> {
        match record {
            LogRecord::Message(message) => encode_message(message, out),
            other => Err(mismatch(RecordKind::Message, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BinaryRecord;

    #[test]
    fn test_wrong_kind_is_rejected() {
        let record = LogRecord::Binary(BinaryRecord {
            tag: "t".to_string(),
            payload: vec![1],
            timestamp: 0,
        });
        let mut out = Vec::new();

        let err = TextEncoder.encode(&record, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch {
                expected: RecordKind::Text,
                actual: RecordKind::Binary
            }
        ));
        assert!(out.is_empty());

        BinaryEncoder.encode(&record, &mut out).unwrap();
        assert_eq!(out.len(), 8 + 4 + 1 + 4 + 1);
    }
}
