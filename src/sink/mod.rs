//! Per-kind sinks that turn records into bytes on a rolling file.

mod encoder;
mod registry;

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::record::{LogRecord, RecordKind};
use crate::rolling::{RollingConfig, RollingFileManager, RollingStrategies};
use crate::warn::RateLimitedWarn;
use crate::Result;

pub use encoder::{BinaryEncoder, MessageEncoder, RecordEncoder, TextEncoder};
pub use registry::{DefaultSinkFactory, SinkFactory, SinkRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was appended; carries the encoded length.
    Written(usize),
    /// The disk gate refused the write; the record was dropped.
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub bytes: u64,
    pub rejected: u64,
    pub rotations: u64,
}

/// A destination for one kind of record.
///
/// Implementations serialize their own writes; every method may be called
/// concurrently from producer threads and the pipeline consumer.
pub trait LogSink: Send + Sync {
    fn kind(&self) -> RecordKind;
    fn name(&self) -> &str;
    fn write(&self, record: &LogRecord) -> Result<WriteOutcome>;
    fn need_rotate(&self) -> bool;
    fn rotate(&self) -> Result<()>;
    fn ensure_writable(&self, size_hint: usize) -> bool;
    fn flush(&self) -> Result<()>;
    fn current_path(&self) -> PathBuf;
    fn stats(&self) -> SinkStats;
}

struct SinkState {
    manager: RollingFileManager,
    scratch: Vec<u8>,
    stats: SinkStats,
    echo: Option<Box<dyn Write + Send>>,
}

/// A sink backed by a [`RollingFileManager`], generic over the encoding.
pub struct RollingSink<E> {
    name: String,
    encoder: E,
    echo_warn: RateLimitedWarn,
    state: Mutex<SinkState>,
}

impl<E: RecordEncoder> RollingSink<E> {
    pub fn new(name: impl Into<String>, encoder: E, manager: RollingFileManager) -> Self {
        Self {
            name: name.into(),
            encoder,
            echo_warn: RateLimitedWarn::default(),
            state: Mutex::new(SinkState {
                manager,
                scratch: Vec::with_capacity(1024),
                stats: SinkStats::default(),
                echo: None,
            }),
        }
    }

    pub fn open(
        name: impl Into<String>,
        encoder: E,
        config: RollingConfig,
        strategies: RollingStrategies,
    ) -> Result<Self> {
        let manager = RollingFileManager::open_with(config, strategies)?;
        Ok(Self::new(name, encoder, manager))
    }

    /// Also copies every encoded record to stdout, even while file writes
    /// are suspended.
    pub fn with_echo(self, echo: bool) -> Self {
        if echo {
            self.with_echo_to(Box::new(std::io::stdout()))
        } else {
            self
        }
    }

    /// Echoes to `out` instead of stdout.
    pub fn with_echo_to(self, out: Box<dyn Write + Send>) -> Self {
        self.lock().echo = Some(out);
        self
    }

    /// Echo writes that failed. Echo is best-effort and never blocks the file write.
    pub fn echo_failures(&self) -> u64 {
        self.echo_warn.total()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E: RecordEncoder> LogSink for RollingSink<E> {
    fn kind(&self) -> RecordKind {
        self.encoder.kind()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, record: &LogRecord) -> Result<WriteOutcome> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.manager.need_rotate() {
            state.manager.rotate()?;
        }

        state.scratch.clear();
        self.encoder.encode(record, &mut state.scratch)?;

        if let Some(out) = state.echo.as_mut() {
            if let Err(err) = out.write_all(&state.scratch).and_then(|()| out.flush()) {
                self.echo_warn.warn("console echo failed", &err);
            }
        }

        if !state.manager.ensure_writable(record.estimated_size()) {
            state.stats.rejected += 1;
            return Ok(WriteOutcome::Rejected);
        }

        state.manager.append(&state.scratch)?;
        let len = state.scratch.len();
        state.stats.written += 1;
        state.stats.bytes += len as u64;
        Ok(WriteOutcome::Written(len))
    }

    fn need_rotate(&self) -> bool {
        self.lock().manager.need_rotate()
    }

    fn rotate(&self) -> Result<()> {
        self.lock().manager.rotate()
    }

    fn ensure_writable(&self, size_hint: usize) -> bool {
        self.lock().manager.ensure_writable(size_hint)
    }

    fn flush(&self) -> Result<()> {
        self.lock().manager.flush()
    }

    fn current_path(&self) -> PathBuf {
        self.lock().manager.current_path().to_path_buf()
    }

    fn stats(&self) -> SinkStats {
        let state = self.lock();
        SinkStats {
            rotations: state.manager.rotations(),
            ..state.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::RecordReader;
    use crate::disk::{DiskPolicy, SpaceProbe};
    use crate::record::{BinaryRecord, LogLevel, TextRecord};
    use crate::Error;
    use std::fs::{self, File};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct SettableProbe(AtomicU64);

    impl SpaceProbe for SettableProbe {
        fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    fn rolling_config(dir: &Path, pattern: &str, max_bytes: u64) -> RollingConfig {
        RollingConfig {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
            max_bytes,
            max_age: Duration::from_secs(3600),
            reserve_n: 8,
            compress_on_rotate: false,
            disk_policy: DiskPolicy::default(),
        }
    }

    fn strategies(probe: Arc<SettableProbe>) -> RollingStrategies {
        RollingStrategies {
            clock: Arc::new(ManualClock::starting_now()),
            space_probe: probe,
            ..RollingStrategies::default()
        }
    }

    fn binary(tag: &str, payload: &[u8]) -> LogRecord {
        LogRecord::Binary(BinaryRecord {
            tag: tag.to_string(),
            payload: payload.to_vec(),
            timestamp: 42,
        })
    }

    #[test]
    fn test_binary_sink_writes_decodable_records() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let sink = RollingSink::open(
            "binary",
            BinaryEncoder,
            rolling_config(dir.path(), "binary_%Y%m%d_%H%M%S_%03d.bin", 1 << 20),
            strategies(probe),
        )?;

        assert_eq!(sink.write(&binary("a", b"one"))?, WriteOutcome::Written(8 + 4 + 1 + 4 + 3));
        sink.write(&binary("", b""))?;
        sink.flush()?;

        let reader = RecordReader::new(File::open(sink.current_path())?, RecordKind::Binary)?;
        let records: Vec<LogRecord> = reader.collect::<Result<_>>()?;
        assert_eq!(records, vec![binary("a", b"one"), binary("", b"")]);
        assert_eq!(sink.stats().written, 2);
        Ok(())
    }

    #[test]
    fn test_hard_pressure_rejects_then_recovers() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let sink = RollingSink::open(
            "binary",
            BinaryEncoder,
            rolling_config(dir.path(), "binary_%03d.bin", 1 << 20),
            strategies(probe.clone()),
        )?;

        probe.0.store(1024, Ordering::SeqCst);
        assert_eq!(sink.write(&binary("t", b"dropped"))?, WriteOutcome::Rejected);

        probe.0.store(GIB, Ordering::SeqCst);
        assert!(matches!(sink.write(&binary("t", b"kept"))?, WriteOutcome::Written(_)));
        sink.flush()?;

        let stats = sink.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.written, 1);
        let reader = RecordReader::new(File::open(sink.current_path())?, RecordKind::Binary)?;
        assert_eq!(reader.count(), 1);
        Ok(())
    }

    #[test]
    fn test_rotates_before_write_when_full() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let sink = RollingSink::open(
            "text",
            TextEncoder,
            rolling_config(dir.path(), "log_%03d.txt", 64),
            strategies(probe),
        )?;

        let record = LogRecord::Text(TextRecord {
            level: LogLevel::Info,
            message: "x".repeat(80),
            file: "main.rs".to_string(),
            function: "main".to_string(),
            timestamp: 0,
            line: 1,
        });
        sink.write(&record)?;
        let first = sink.current_path();
        sink.write(&record)?;
        sink.flush()?;

        assert_ne!(sink.current_path(), first);
        assert_eq!(sink.stats().rotations, 1);
        assert!(fs::read_to_string(first)?.contains(&"x".repeat(80)));
        Ok(())
    }

    #[test]
    fn test_kind_mismatch_is_an_error() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let sink = RollingSink::open(
            "text",
            TextEncoder,
            rolling_config(dir.path(), "log_%03d.txt", 1 << 20),
            strategies(probe),
        )?;

        let err = sink.write(&binary("t", b"x")).unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
        assert_eq!(sink.stats(), SinkStats::default());
        Ok(())
    }

    fn text(message: &str) -> LogRecord {
        LogRecord::Text(TextRecord {
            level: LogLevel::Warning,
            message: message.to_string(),
            file: "echo.rs".to_string(),
            function: "run".to_string(),
            timestamp: 0,
            line: 3,
        })
    }

    #[test]
    fn test_echo_copies_lines_even_when_suspended() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let out = SharedBuf::default();
        let sink = RollingSink::open(
            "text",
            TextEncoder,
            rolling_config(dir.path(), "log_%03d.txt", 1 << 20),
            strategies(probe.clone()),
        )?
        .with_echo_to(Box::new(out.clone()));

        sink.write(&text("on disk"))?;
        probe.0.store(1024, Ordering::SeqCst);
        assert_eq!(sink.write(&text("echo only"))?, WriteOutcome::Rejected);
        sink.flush()?;

        let echoed = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(echoed.contains("on disk"));
        assert!(echoed.contains("echo only"));
        let on_disk = fs::read_to_string(sink.current_path())?;
        assert!(on_disk.contains("on disk"));
        assert!(!on_disk.contains("echo only"));
        assert_eq!(sink.echo_failures(), 0);
        Ok(())
    }

    #[test]
    fn test_failed_echo_is_counted_and_file_write_proceeds() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(SettableProbe(AtomicU64::new(GIB)));
        let sink = RollingSink::open(
            "text",
            TextEncoder,
            rolling_config(dir.path(), "log_%03d.txt", 1 << 20),
            strategies(probe),
        )?
        .with_echo_to(Box::new(BrokenPipe));

        assert!(matches!(sink.write(&text("first"))?, WriteOutcome::Written(_)));
        assert!(matches!(sink.write(&text("second"))?, WriteOutcome::Written(_)));

        assert_eq!(sink.echo_failures(), 2);
        assert_eq!(sink.stats().written, 2);
        Ok(())
    }
}
