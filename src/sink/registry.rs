use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{BinaryEncoder, LogSink, MessageEncoder, RollingSink, TextEncoder, WriteOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::{LoggerConfig, ModuleConfig};
use crate::disk::{OldestFirst, ReclaimStrategy, SpaceProbe, StatvfsProbe};
use crate::record::{LogRecord, RecordKind};
use crate::rolling::{HybridRotationPolicy, RollingConfig, RollingStrategies};
use crate::warn::RateLimitedWarn;
use crate::Result;

/// Builds the sink for one configured module.
pub trait SinkFactory: Send + Sync {
    /// `process_dir` is `<base_dir>/<process_name>`; the sink writes under
    /// `<process_dir>/<module.name>`.
    fn create(
        &self,
        process_dir: &Path,
        module: &ModuleConfig,
        config: &LoggerConfig,
    ) -> Result<Arc<dyn LogSink>>;
}

/// Creates [`RollingSink`]s with the module's codec and the given clock and
/// space probe.
#[derive(Clone)]
pub struct DefaultSinkFactory {
    clock: Arc<dyn Clock>,
    space_probe: Arc<dyn SpaceProbe>,
    reclaim: Arc<dyn ReclaimStrategy>,
}

impl Default for DefaultSinkFactory {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            space_probe: Arc::new(StatvfsProbe),
            reclaim: Arc::new(OldestFirst),
        }
    }
}

impl DefaultSinkFactory {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = probe;
        self
    }

    pub fn with_reclaim_strategy(mut self, reclaim: Arc<dyn ReclaimStrategy>) -> Self {
        self.reclaim = reclaim;
        self
    }
}

impl SinkFactory for DefaultSinkFactory {
    fn create(
        &self,
        process_dir: &Path,
        module: &ModuleConfig,
        config: &LoggerConfig,
    ) -> Result<Arc<dyn LogSink>> {
        let rolling = RollingConfig {
            dir: process_dir.join(&module.name),
            pattern: module.pattern.clone(),
            max_bytes: module.max_bytes,
            max_age: module.max_age(),
            reserve_n: module.reserve_n,
            compress_on_rotate: module.compress_old,
            disk_policy: config.disk,
        };
        let strategies = RollingStrategies {
            rotation: Arc::new(HybridRotationPolicy),
            compression: module.compression.strategy()?,
            clock: self.clock.clone(),
            space_probe: self.space_probe.clone(),
            reclaim: self.reclaim.clone(),
        };

        let name = module.name.clone();
        let sink: Arc<dyn LogSink> = match module.kind() {
            RecordKind::Text => Arc::new(
                RollingSink::open(name, TextEncoder, rolling, strategies)?
                    .with_echo(config.console_echo),
            ),
            RecordKind::Binary => Arc::new(RollingSink::open(name, BinaryEncoder, rolling, strategies)?),
            RecordKind::Message => Arc::new(RollingSink::open(name, MessageEncoder, rolling, strategies)?),
        };
        Ok(sink)
    }
}

/// Sinks keyed by the record kind they accept.
pub struct SinkRegistry {
    sinks: HashMap<RecordKind, Arc<dyn LogSink>>,
    write_failures: RateLimitedWarn,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl SinkRegistry {
    pub fn empty() -> Self {
        Self {
            sinks: HashMap::new(),
            write_failures: RateLimitedWarn::default(),
        }
    }

    /// Creates one sink per module. A module whose sink cannot be created is
    /// logged and skipped; the first module of a kind wins.
    pub fn build(config: &LoggerConfig, factory: &dyn SinkFactory) -> Self {
        let process_dir = config.process_dir();
        let mut registry = Self::empty();
        for module in &config.modules {
            let kind = module.kind();
            if registry.sinks.contains_key(&kind) {
                log::warn!(
                    "module {} ignored: a {kind} sink is already configured",
                    module.name
                );
                continue;
            }
            match factory.create(&process_dir, module, config) {
                Ok(sink) => {
                    log::info!(
                        "created {kind} sink {} in {}",
                        module.name,
                        process_dir.join(&module.name).display()
                    );
                    registry.sinks.insert(kind, sink);
                }
                Err(err) => log::error!("failed to create sink {}: {err}", module.name),
            }
        }
        registry
    }

    /// Registers `sink` under its kind, returning any sink it replaces.
    pub fn insert(&mut self, sink: Arc<dyn LogSink>) -> Option<Arc<dyn LogSink>> {
        self.sinks.insert(sink.kind(), sink)
    }

    pub fn get(&self, kind: RecordKind) -> Option<&Arc<dyn LogSink>> {
        self.sinks.get(&kind)
    }

    /// Writes `record` to the sink for its kind. Returns false when no such
    /// sink is registered. Write errors are logged, never returned.
    pub fn dispatch(&self, record: &LogRecord) -> bool {
        let Some(sink) = self.sinks.get(&record.kind()) else {
            return false;
        };
        match sink.write(record) {
            Ok(WriteOutcome::Written(_)) | Ok(WriteOutcome::Rejected) => {}
            Err(err) => {
                self.write_failures
                    .warn(&format!("write to sink {} failed", sink.name()), &err);
            }
        }
        true
    }

    pub fn flush_all(&self) {
        for sink in self.sinks.values() {
            if let Err(err) = sink.flush() {
                log::warn!("flush of sink {} failed: {err}", sink.name());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
