//! The logging context: configuration, sinks, level filter and the
//! sync/async switch.
//!
//! Nothing here is global. Hosts create a [`Logger`], share it (it is
//! `Send + Sync`), and drop it to stop the consumer and flush every sink.
//! The logging calls never return errors; only construction and reload do.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::LoggerConfig;
use crate::pipeline::{Pipeline, PipelineCounters, PipelineStats, RecordDispatcher};
use crate::record::{BinaryRecord, LogLevel, LogRecord, MessageRecord, RecordKind, TextRecord};
use crate::sink::{DefaultSinkFactory, SinkFactory, SinkRegistry, SinkStats};
use crate::{Error, Result};

/// Routes records to whichever registry is current.
struct Shared {
    registry: RwLock<Arc<SinkRegistry>>,
}

impl Shared {
    fn current(&self) -> Arc<SinkRegistry> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace(&self, registry: SinkRegistry) -> Arc<SinkRegistry> {
        let mut slot = self.registry.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, Arc::new(registry))
    }
}

impl RecordDispatcher for Shared {
    fn dispatch(&self, record: &LogRecord) -> bool {
        self.current().dispatch(record)
    }
}

pub struct Logger {
    shared: Arc<Shared>,
    factory: Arc<dyn SinkFactory>,
    clock: Arc<dyn Clock>,
    level: AtomicU8,
    counters: Arc<PipelineCounters>,
    /// Held shared by producers while they enqueue or write synchronously,
    /// exclusively by mode switches and reloads.
    pipeline: RwLock<Option<Pipeline>>,
    /// Serializes reloads and mode switches. Taken before `pipeline`.
    config: Mutex<LoggerConfig>,
    /// Set when built from a file; [`Logger::reload_config_file`] re-reads it.
    config_path: Option<PathBuf>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DefaultSinkFactory::default()))
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut logger = Self::new(LoggerConfig::from_file(path)?)?;
        logger.config_path = Some(path.to_path_buf());
        Ok(logger)
    }

    pub fn with_factory(config: LoggerConfig, factory: Arc<dyn SinkFactory>) -> Result<Self> {
        Self::with_parts(config, factory, Arc::new(SystemClock))
    }

    /// `clock` stamps records; the factory decides the clock used for files.
    pub fn with_parts(
        config: LoggerConfig,
        factory: Arc<dyn SinkFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = SinkRegistry::build(&config, factory.as_ref());
        let logger = Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Arc::new(registry)),
            }),
            factory,
            clock,
            level: AtomicU8::new(config.log_level.as_u8()),
            counters: Arc::new(PipelineCounters::default()),
            pipeline: RwLock::new(None),
            config: Mutex::new(config.clone()),
            config_path: None,
        };
        if config.async_mode {
            let mut slot = logger.write_pipeline();
            logger.switch_mode(&mut slot, true, config.async_queue_size)?;
            drop(slot);
        }
        Ok(logger)
    }

    /// Writes a text record if `level` passes the current filter.
    pub fn log(&self, level: LogLevel, message: &str, file: &str, function: &str, line: u32) {
        if level < self.level() {
            return;
        }
        self.submit(LogRecord::Text(TextRecord {
            level,
            message: message.to_string(),
            file: file.to_string(),
            function: function.to_string(),
            timestamp: self.clock.now_micros(),
            line,
        }));
    }

    pub fn log_binary(&self, data: &[u8], tag: &str) {
        self.submit(LogRecord::Binary(BinaryRecord {
            tag: tag.to_string(),
            payload: data.to_vec(),
            timestamp: self.clock.now_micros(),
        }));
    }

    pub fn record_message(&self, topic: &str, msg_type: &str, data: &[u8]) {
        self.submit(LogRecord::Message(MessageRecord {
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
            payload: data.to_vec(),
            timestamp: self.clock.now_micros(),
        }));
    }

    /// Enqueues `record` in async mode, otherwise writes it on this thread.
    ///
    /// The pipeline read guard is held across the synchronous write, so a
    /// reload or mode switch waits for in-flight writes to finish.
    pub fn submit(&self, record: LogRecord) {
        let slot = self.read_pipeline();
        match slot.as_ref() {
            Some(pipeline) => pipeline.enqueue(record),
            None => {
                let delivered = self.shared.dispatch(&record);
                self.counters.record_delivery(delivered);
            }
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Starts or stops the consumer. Stopping returns after every queued
    /// record has been written.
    pub fn set_async_mode(&self, enable: bool) -> Result<()> {
        let mut config = self.lock_config();
        let mut slot = self.write_pipeline();
        self.switch_mode(&mut slot, enable, config.async_queue_size)?;
        config.async_mode = enable;
        Ok(())
    }

    pub fn is_async(&self) -> bool {
        self.read_pipeline().is_some()
    }

    /// Flushes every sink's buffered bytes. Records still queued in async
    /// mode are not waited for.
    pub fn flush(&self) {
        let _slot = self.read_pipeline();
        self.shared.current().flush_all();
    }

    /// The active configuration, including runtime level and mode changes.
    pub fn current_config(&self) -> LoggerConfig {
        let mut config = self.lock_config().clone();
        config.log_level = self.level();
        config
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn sink_stats(&self, kind: RecordKind) -> Option<SinkStats> {
        self.shared.current().get(kind).map(|sink| sink.stats())
    }

    /// Replaces every sink with ones built from `new_config`.
    ///
    /// The consumer is stopped (draining into the old sinks) and the old
    /// sinks are flushed before the new ones open their files. An invalid
    /// config is rejected and leaves the logger unchanged.
    pub fn reload(&self, new_config: LoggerConfig) -> Result<()> {
        new_config.validate()?;
        let mut config = self.lock_config();
        let mut slot = self.write_pipeline();

        self.switch_mode(&mut slot, false, 0)?;

        let old = self.shared.replace(SinkRegistry::empty());
        old.flush_all();
        drop(old);

        let registry = SinkRegistry::build(&new_config, self.factory.as_ref());
        log::info!("reloaded configuration with {} sink(s)", registry.len());
        self.shared.replace(registry);
        self.set_level(new_config.log_level);

        self.switch_mode(&mut slot, new_config.async_mode, new_config.async_queue_size)?;
        *config = new_config;
        Ok(())
    }

    /// Re-reads the file this logger was built from with
    /// [`Logger::from_config_file`].
    pub fn reload_config_file(&self) -> Result<()> {
        match &self.config_path {
            Some(path) => self.reload_from_file(path),
            None => Err(Error::InvalidConfig(
                "logger was not created from a config file".to_string(),
            )),
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config = LoggerConfig::from_file(path)?;
        self.reload(config)?;
        log::info!("configuration reloaded from {}", path.display());
        Ok(())
    }

    fn switch_mode(&self, slot: &mut Option<Pipeline>, enable: bool, capacity: usize) -> Result<()> {
        match (enable, slot.is_some()) {
            (true, false) => {
                let dispatcher: Arc<dyn RecordDispatcher> = self.shared.clone();
                *slot = Some(Pipeline::start(capacity, dispatcher, self.counters.clone())?);
            }
            (false, true) => {
                if let Some(pipeline) = slot.take() {
                    pipeline.stop();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn lock_config(&self) -> MutexGuard<'_, LoggerConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_pipeline(&self) -> RwLockReadGuard<'_, Option<Pipeline>> {
        self.pipeline.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_pipeline(&self) -> RwLockWriteGuard<'_, Option<Pipeline>> {
        self.pipeline.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if let Some(pipeline) = self.write_pipeline().take() {
            pipeline.stop();
        }
        self.flush();
    }
}
