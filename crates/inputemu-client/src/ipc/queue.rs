//! Message queue seam and the in-process backend.
//!
//! A queue holds at most `capacity` records of at most `record_size` bytes.
//! Sending never blocks: a full queue is an error. Receiving waits at most the
//! given timeout.

use crate::ipc::error::TransportError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A named, bounded queue of fixed-maximum-size records.
pub trait MessageQueue: Send + Sync {
    /// Name the queue was opened or created under.
    fn name(&self) -> &str;

    /// Largest record the queue accepts.
    fn record_size(&self) -> usize;

    /// Enqueue a record without blocking.
    fn send(&self, record: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for a record and copy it into `buf`.
    ///
    /// Returns the record length, or `None` if nothing arrived in time.
    /// `buf` must hold at least `record_size()` bytes.
    fn timed_receive(&self, buf: &mut [u8], timeout: Duration)
        -> Result<Option<usize>, TransportError>;
}

/// Opens, creates and removes named queues.
pub trait QueueProvider: Send + Sync {
    /// Open an existing queue.
    fn open(&self, name: &str) -> Result<Arc<dyn MessageQueue>, TransportError>;

    /// Create a fresh queue, destroying any queue already using the name.
    fn create(
        &self,
        name: &str,
        capacity: usize,
        record_size: usize,
    ) -> Result<Arc<dyn MessageQueue>, TransportError>;

    /// Remove a queue by name. Removing a missing queue is not an error.
    fn remove(&self, name: &str) -> Result<(), TransportError>;
}

// =============================================================================
// IN-PROCESS BACKEND
// =============================================================================

struct MemoryQueueState {
    records: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Bounded queue living in this process's memory.
pub struct MemoryQueue {
    name: String,
    capacity: usize,
    record_size: usize,
    state: Mutex<MemoryQueueState>,
    available: Condvar,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, capacity: usize, record_size: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            record_size,
            state: Mutex::new(MemoryQueueState {
                records: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Close the queue. Pending records can still be drained; sends fail and
    /// an empty closed queue reports [`TransportError::QueueClosed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn send(&self, record: &[u8]) -> Result<(), TransportError> {
        if record.len() > self.record_size {
            return Err(TransportError::RecordTooLarge {
                size: record.len(),
                max: self.record_size,
            });
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::QueueClosed(self.name.clone()));
        }
        if state.records.len() >= self.capacity {
            return Err(TransportError::QueueFull(self.name.clone()));
        }
        state.records.push_back(record.to_vec());
        self.available.notify_one();
        Ok(())
    }

    fn timed_receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<usize>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(record) = state.records.pop_front() {
                if record.len() > buf.len() {
                    return Err(TransportError::RecordTooLarge {
                        size: record.len(),
                        max: buf.len(),
                    });
                }
                buf[..record.len()].copy_from_slice(&record);
                return Ok(Some(record.len()));
            }
            if state.closed {
                return Err(TransportError::QueueClosed(self.name.clone()));
            }
            if self.available.wait_until(&mut state, deadline).timed_out()
                && state.records.is_empty()
            {
                return if state.closed {
                    Err(TransportError::QueueClosed(self.name.clone()))
                } else {
                    Ok(None)
                };
            }
        }
    }
}

/// Process-local namespace of [`MemoryQueue`]s.
///
/// Clones share the namespace, so a simulated server and any number of
/// clients in the same process can find each other's queues by name.
#[derive(Clone, Default)]
pub struct MemoryQueueProvider {
    queues: Arc<Mutex<HashMap<String, Arc<MemoryQueue>>>>,
}

impl MemoryQueueProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed access to a queue in the namespace.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        self.queues.lock().get(name).cloned()
    }

    /// Whether a queue with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.queues.lock().contains_key(name)
    }

    /// Names of all queues in the namespace.
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }
}

impl QueueProvider for MemoryQueueProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn MessageQueue>, TransportError> {
        match self.get(name) {
            Some(queue) => Ok(queue),
            None => Err(TransportError::QueueNotFound(name.to_string())),
        }
    }

    fn create(
        &self,
        name: &str,
        capacity: usize,
        record_size: usize,
    ) -> Result<Arc<dyn MessageQueue>, TransportError> {
        if capacity == 0 || record_size == 0 {
            return Err(TransportError::CreateFailed {
                queue: name.to_string(),
                reason: "capacity and record size must be non-zero".into(),
            });
        }
        let queue = Arc::new(MemoryQueue::new(name, capacity, record_size));
        let previous = self
            .queues
            .lock()
            .insert(name.to_string(), Arc::clone(&queue));
        if let Some(previous) = previous {
            debug!(queue = name, "Replaced stale in-process queue");
            previous.close();
        }
        Ok(queue)
    }

    fn remove(&self, name: &str) -> Result<(), TransportError> {
        if let Some(queue) = self.queues.lock().remove(name) {
            queue.close();
        }
        Ok(())
    }
}
