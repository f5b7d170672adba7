use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct State<T> {
    items: VecDeque<T>,
    stopping: bool,
}

/// Bounded FIFO that never blocks producers: when full, the oldest item is
/// evicted to make room.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Result of one consumer wait.
pub struct Batch<T> {
    pub items: Vec<T>,
    /// Stop was requested and the queue was empty once this batch was taken.
    pub finished: bool,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(4096)),
                stopping: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends `item`, returning the evicted oldest item if the queue was full.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.lock();
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };
        self.ready.notify_one();
        evicted
    }

    /// Waits up to `wait` for items or a stop request, then takes at most
    /// `max` items from the front.
    pub fn next_batch(&self, max: usize, wait: Duration) -> Batch<T> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, wait, |s| s.items.is_empty() && !s.stopping)
            .unwrap_or_else(|e| e.into_inner());
        let take = state.items.len().min(max);
        let items: Vec<T> = state.items.drain(..take).collect();
        Batch {
            finished: state.stopping && state.items.is_empty() && items.is_empty(),
            items,
        }
    }

    pub fn stop(&self) {
        self.lock().stopping = true;
        self.ready.notify_all();
    }

    /// Removes and returns everything still queued.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
