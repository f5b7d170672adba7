use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use rotalog::codec::RecordReader;
use rotalog::disk::SpaceProbe;
use rotalog::sink::DefaultSinkFactory;
use rotalog::{LogLevel, LogRecord, Logger, LoggerConfig, ModuleConfig, RecordKind};
use tempfile::tempdir;

struct PlentyOfSpace;

impl SpaceProbe for PlentyOfSpace {
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
}

fn config(base: &Path, process: &str, async_mode: bool) -> LoggerConfig {
    let mut config = LoggerConfig::with_base_dir(base);
    config.process_name = Some(process.to_string());
    config.async_mode = async_mode;
    config.log_level = LogLevel::Debug;
    config
}

fn open(config: LoggerConfig) -> Logger {
    let factory = DefaultSinkFactory::default().with_space_probe(Arc::new(PlentyOfSpace));
    Logger::with_factory(config, Arc::new(factory)).expect("logger")
}

fn only_file(dir: &Path) -> PathBuf {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read_dir")
        .flatten()
        .map(|e| e.path())
        .collect();
    assert_eq!(files.len(), 1, "{files:?}");
    files.remove(0)
}

fn read_records(path: &Path, kind: RecordKind) -> Vec<LogRecord> {
    RecordReader::new(File::open(path).expect("open"), kind)
        .expect("reader")
        .collect::<rotalog::Result<Vec<_>>>()
        .expect("decode")
}

fn write_all_kinds(logger: &Logger) {
    logger.log(LogLevel::Info, "engine started", "main.rs", "main", 12);
    logger.log(LogLevel::Debug, "tick", "loop.rs", "run", 40);
    logger.log_binary(&[0xde, 0xad, 0xbe, 0xef], "frame");
    logger.log_binary(&[], "");
    logger.record_message("/odom", "nav_msgs/Odometry", b"\x01\x02");
}

fn assert_streams(process_dir: &Path) {
    let text = fs::read_to_string(only_file(&process_dir.join("text"))).expect("text");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" INFO main.rs:12 main - engine started"));
    assert!(lines[1].ends_with(" DEBUG loop.rs:40 run - tick"));

    let binary = read_records(&only_file(&process_dir.join("binary")), RecordKind::Binary);
    assert_eq!(binary.len(), 2);
    match (&binary[0], &binary[1]) {
        (LogRecord::Binary(a), LogRecord::Binary(b)) => {
            assert_eq!(a.tag, "frame");
            assert_eq!(a.payload, [0xde, 0xad, 0xbe, 0xef]);
            assert_eq!(b.tag, "");
            assert!(b.payload.is_empty());
            assert!(a.timestamp <= b.timestamp);
        }
        other => panic!("unexpected records {other:?}"),
    }

    let messages = read_records(&only_file(&process_dir.join("bag")), RecordKind::Message);
    match messages.as_slice() {
        [LogRecord::Message(m)] => {
            assert_eq!(m.topic, "/odom");
            assert_eq!(m.msg_type, "nav_msgs/Odometry");
            assert_eq!(m.payload, [1, 2]);
        }
        other => panic!("unexpected records {other:?}"),
    }
}

#[test]
fn sync_mode_writes_every_stream() {
    let dir = tempdir().expect("tempdir");
    let logger = open(config(dir.path(), "svc", false));
    assert!(!logger.is_async());

    write_all_kinds(&logger);
    logger.flush();

    assert_streams(&dir.path().join("svc"));
    assert_eq!(logger.pipeline_stats().enqueued, 0);
}

#[test]
fn async_mode_writes_every_stream_after_drop() {
    let dir = tempdir().expect("tempdir");
    {
        let logger = open(config(dir.path(), "svc", true));
        assert!(logger.is_async());
        write_all_kinds(&logger);
    }
    assert_streams(&dir.path().join("svc"));
}

#[test]
fn missing_sink_discards_records() {
    let dir = tempdir().expect("tempdir");
    let mut cfg = config(dir.path(), "svc", false);
    cfg.modules.retain(|m| m.name == "text");
    let logger = open(cfg);

    logger.log_binary(b"nowhere", "lost");
    logger.log(LogLevel::Error, "kept", "a.rs", "f", 1);

    let stats = logger.pipeline_stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.dispatched, 1);
    assert!(logger.sink_stats(RecordKind::Binary).is_none());
}

#[test]
fn reload_moves_streams_and_applies_level() {
    let dir = tempdir().expect("tempdir");
    let logger = open(config(dir.path(), "before", true));
    logger.log(LogLevel::Info, "first", "a.rs", "f", 1);

    let mut next = config(dir.path(), "after", false);
    next.log_level = LogLevel::Error;
    next.modules = vec![ModuleConfig::new("text", "app_%Y%m%d_%H%M%S_%03d.log")];
    logger.reload(next).expect("reload");

    assert!(!logger.is_async());
    assert_eq!(logger.level(), LogLevel::Error);
    logger.log(LogLevel::Info, "filtered", "a.rs", "f", 2);
    logger.log(LogLevel::Critical, "second", "a.rs", "f", 3);
    logger.flush();

    let before = fs::read_to_string(only_file(&dir.path().join("before/text"))).expect("before");
    assert!(before.contains("first"));
    let after_path = only_file(&dir.path().join("after/text"));
    assert!(after_path.to_string_lossy().ends_with("_000.log"));
    let after = fs::read_to_string(after_path).expect("after");
    assert!(!after.contains("filtered"));
    assert!(after.contains("CRITICAL a.rs:3 f - second"));

    let current = logger.current_config();
    assert_eq!(current.modules.len(), 1);
    assert_eq!(current.process_name.as_deref(), Some("after"));
}

#[test]
fn invalid_reload_leaves_logger_untouched() {
    let dir = tempdir().expect("tempdir");
    let logger = open(config(dir.path(), "svc", false));

    let mut bad = config(dir.path(), "svc", false);
    bad.async_queue_size = 0;
    assert!(logger.reload(bad).is_err());

    logger.log(LogLevel::Info, "still here", "a.rs", "f", 1);
    assert_eq!(logger.sink_stats(RecordKind::Text).expect("text").written, 1);
}

#[test]
fn reload_from_saved_file() {
    let dir = tempdir().expect("tempdir");
    let logger = open(config(dir.path(), "svc", false));

    let mut saved = config(dir.path(), "svc", true);
    saved.async_queue_size = 64;
    let path = dir.path().join("rotalog.json");
    saved.save_to_file(&path).expect("save");

    logger.reload_from_file(&path).expect("reload");
    assert!(logger.is_async());
    assert_eq!(logger.current_config().async_queue_size, 64);

    assert!(logger.reload_from_file(dir.path().join("missing.json")).is_err());
}

fn text_lines(dir: &Path) -> usize {
    fs::read_dir(dir)
        .expect("read_dir")
        .flatten()
        .map(|e| fs::read_to_string(e.path()).expect("read").lines().count())
        .sum()
}

/// Runs `producers` threads calling `log` until `control` returns, then
/// returns how many records they submitted.
fn log_while(logger: &Logger, producers: usize, control: impl FnOnce()) -> u64 {
    let stop = AtomicBool::new(false);
    let submitted = AtomicU64::new(0);
    thread::scope(|scope| {
        for t in 0..producers {
            let (stop, submitted) = (&stop, &submitted);
            scope.spawn(move || {
                let mut n = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    logger.log(LogLevel::Info, "busy", "worker.rs", "run", t as u32);
                    n += 1;
                }
                submitted.fetch_add(n, Ordering::Relaxed);
            });
        }
        control();
        stop.store(true, Ordering::Relaxed);
    });
    submitted.load(Ordering::Relaxed)
}

#[test]
fn sync_writes_are_never_lost_across_reloads() {
    let dir = tempdir().expect("tempdir");
    let cfg = config(dir.path(), "svc", false);
    let logger = open(cfg.clone());

    let submitted = log_while(&logger, 8, || {
        for _ in 0..500 {
            logger.reload(cfg.clone()).expect("reload");
        }
    });
    logger.flush();

    let stats = logger.pipeline_stats();
    assert!(submitted > 0);
    assert_eq!(stats.discarded, 0, "{stats:?}");
    assert_eq!(stats.dispatched, submitted, "{stats:?}");
    assert_eq!(text_lines(&dir.path().join("svc/text")) as u64, submitted);
}

#[test]
fn mode_switches_and_reloads_under_load_account_for_every_record() {
    let dir = tempdir().expect("tempdir");
    let sync_cfg = config(dir.path(), "svc", false);
    let mut async_cfg = config(dir.path(), "svc", true);
    async_cfg.async_queue_size = 256;
    let logger = open(sync_cfg.clone());

    let submitted = log_while(&logger, 6, || {
        for round in 0..200 {
            match round % 4 {
                0 => logger.set_async_mode(true).expect("async on"),
                1 => logger.reload(sync_cfg.clone()).expect("reload sync"),
                2 => logger.reload(async_cfg.clone()).expect("reload async"),
                _ => logger.set_async_mode(false).expect("async off"),
            }
        }
    });
    logger.set_async_mode(false).expect("async off");
    logger.flush();

    let stats = logger.pipeline_stats();
    let sync_writes = submitted - stats.enqueued;
    assert_eq!(stats.discarded, 0, "{stats:?}");
    assert_eq!(
        stats.dispatched + stats.dropped,
        stats.enqueued + sync_writes,
        "{stats:?}"
    );
    assert_eq!(
        text_lines(&dir.path().join("svc/text")) as u64,
        stats.dispatched
    );
}
