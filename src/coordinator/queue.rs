//! Per-connection command queues
//!
//! Items are pushed in arrival order and drained by whichever caller holds
//! the drain lock, so one connection never has two commands in flight while
//! different connections drain concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

/// FIFO of pending items for one connection
#[derive(Debug)]
pub struct CommandQueue<T> {
    pending: Mutex<VecDeque<T>>,
    drain: Mutex<()>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            drain: Mutex::new(()),
        }
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.pending.lock().push_back(item);
    }

    /// Take the drain lock and run `process` on every pending item, oldest
    /// first, until the queue is empty
    pub fn drain(&self, mut process: impl FnMut(T)) {
        let _draining = self.drain.lock();
        loop {
            let Some(item) = self.pending.lock().pop_front() else {
                break;
            };
            process(item);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queues keyed by session id
#[derive(Debug)]
pub struct QueueRegistry<T> {
    queues: Mutex<HashMap<u64, Arc<CommandQueue<T>>>>,
}

impl<T> Default for QueueRegistry<T> {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> QueueRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's queue, created on first use
    pub fn get(&self, session_id: u64) -> Arc<CommandQueue<T>> {
        Arc::clone(self.queues.lock().entry(session_id).or_default())
    }

    pub fn remove(&self, session_id: u64) -> bool {
        self.queues.lock().remove(&session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
