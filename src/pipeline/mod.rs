//! Asynchronous ingestion: a bounded drop-oldest queue drained by a single
//! consumer thread.
//!
//! Producers never block on I/O; they only take the queue lock. The consumer
//! takes up to [`CONSUMER_BATCH`] records per wakeup and hands them to a
//! [`RecordDispatcher`] in FIFO order. Stopping wakes the consumer, lets it
//! drain everything that was queued, and joins it.

mod queue;
mod stats;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::record::LogRecord;
use crate::sink::SinkRegistry;
use crate::warn::RateLimitedWarn;
use crate::Result;

pub use queue::{Batch, BoundedQueue};
pub use stats::{PipelineCounters, PipelineStats};

pub const CONSUMER_BATCH: usize = 100;
pub const CONSUMER_WAIT: Duration = Duration::from_millis(100);

/// Receives records drained from the queue.
pub trait RecordDispatcher: Send + Sync {
    /// Returns false when nothing accepts records of this kind.
    fn dispatch(&self, record: &LogRecord) -> bool;
}

impl RecordDispatcher for SinkRegistry {
    fn dispatch(&self, record: &LogRecord) -> bool {
        SinkRegistry::dispatch(self, record)
    }
}

pub struct Pipeline {
    queue: Arc<BoundedQueue<LogRecord>>,
    dispatcher: Arc<dyn RecordDispatcher>,
    counters: Arc<PipelineCounters>,
    overflow: RateLimitedWarn,
    worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts the consumer thread.
    pub fn start(
        capacity: usize,
        dispatcher: Arc<dyn RecordDispatcher>,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self> {
        let queue = Arc::new(BoundedQueue::new(capacity));
        let worker = {
            let queue = queue.clone();
            let dispatcher = dispatcher.clone();
            let counters = counters.clone();
            thread::Builder::new()
                .name("rotalog-consumer".to_string())
                .spawn(move || consume(&queue, dispatcher.as_ref(), &counters))?
        };
        log::info!("async mode enabled (queue capacity {})", queue.capacity());
        Ok(Self {
            queue,
            dispatcher,
            counters,
            overflow: RateLimitedWarn::default(),
            worker: Some(worker),
        })
    }

    pub fn enqueue(&self, record: LogRecord) {
        self.counters.record_enqueued();
        if self.queue.push(record).is_some() {
            let dropped = self.counters.record_dropped();
            self.overflow.warn(
                "async queue full, oldest record dropped",
                &format!("capacity {}, {dropped} dropped so far", self.queue.capacity()),
            );
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Stops the consumer after it has drained the queue. Anything left
    /// behind (e.g. by a panicked consumer) is dispatched on this thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.queue.stop();
        if worker.join().is_err() {
            log::error!("async consumer panicked");
        }
        for record in self.queue.drain() {
            let delivered = self.dispatcher.dispatch(&record);
            self.counters.record_delivery(delivered);
        }
        log::info!("async mode disabled");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn consume(
    queue: &BoundedQueue<LogRecord>,
    dispatcher: &dyn RecordDispatcher,
    counters: &PipelineCounters,
) {
    loop {
        let batch = queue.next_batch(CONSUMER_BATCH, CONSUMER_WAIT);
        if batch.finished {
            break;
        }
        for record in &batch.items {
            counters.record_delivery(dispatcher.dispatch(record));
        }
    }
}
