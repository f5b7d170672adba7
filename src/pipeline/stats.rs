use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Records evicted because the queue was full.
    pub dropped: u64,
    /// Records handed to a sink.
    pub dispatched: u64,
    /// Records with no sink for their kind.
    pub discarded: u64,
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    discarded: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_delivery(&self, delivered: bool) {
        if delivered {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
