//! Reply Dispatcher - the single reader of a session's reply queue.
//!
//! Runs on a dedicated thread from connect until teardown. Every iteration is
//! a bounded receive, so a stop request is observed within one receive
//! timeout even when no traffic arrives. Nothing that happens inside the loop
//! propagates to callers: malformed records and receive failures are logged
//! and the loop continues.

use crate::domain::pending::PendingCallRegistry;
use crate::ipc::error::TransportError;
use crate::ipc::transport::{Received, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the dispatcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    StopRequested,
    Stopped,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Running,
            1 => DispatcherState::StopRequested,
            _ => DispatcherState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Running => 0,
            DispatcherState::StopRequested => 1,
            DispatcherState::Stopped => 2,
        }
    }
}

/// Timing of the receive loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherTiming {
    /// Bounded wait of each receive
    pub receive_timeout: Duration,
    /// Pause after an empty receive
    pub idle_sleep: Duration,
}

/// Counters kept by the loop
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub replies_received: AtomicU64,
    pub records_dropped: AtomicU64,
    pub receive_errors: AtomicU64,
}

struct Shared {
    state: AtomicU8,
    stats: DispatcherStats,
}

impl Shared {
    fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Handle to a running dispatcher thread.
pub struct ReplyDispatcher {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplyDispatcher {
    /// Start the loop on a new thread.
    pub fn spawn(
        transport: Arc<Transport>,
        registry: Arc<PendingCallRegistry>,
        timing: DispatcherTiming,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(DispatcherState::Running.as_u8()),
            stats: DispatcherStats::default(),
        });

        let thread_name = format!("inputemu-dispatch-{}", transport.client_queue_name());
        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(thread_name)
                .spawn(move || run(&transport, &registry, &shared, timing))?
        };

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    pub fn stats(&self) -> &DispatcherStats {
        &self.shared.stats
    }

    /// Request the loop to stop and join its thread. Idempotent.
    ///
    /// Returns once the loop has exited, so the reply queue can be removed
    /// safely afterwards.
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if self.shared.state() == DispatcherState::Running {
            self.shared.set_state(DispatcherState::StopRequested);
        }
        if handle.join().is_err() {
            error!("Reply dispatcher thread panicked");
        }
        self.shared.set_state(DispatcherState::Stopped);
    }
}

impl Drop for ReplyDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    transport: &Transport,
    registry: &PendingCallRegistry,
    shared: &Shared,
    timing: DispatcherTiming,
) {
    info!(client_queue = %transport.client_queue_name(), "Reply dispatcher started");

    while shared.state() == DispatcherState::Running {
        match transport.receive(timing.receive_timeout) {
            Ok(Received::Reply(reply)) => {
                shared.stats.replies_received.fetch_add(1, Ordering::Relaxed);
                trace!(
                    request_id = reply.request_id,
                    status = %reply.status,
                    "Received reply"
                );
                registry.resolve(reply);
            }
            Ok(Received::TimedOut) => thread::sleep(timing.idle_sleep),
            Ok(Received::Dropped { .. }) => {
                shared.stats.records_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TransportError::Wire(e)) => {
                shared.stats.records_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Discarding malformed reply record");
            }
            Err(e) => {
                shared.stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Error receiving from client-side message queue");
                // keep a failing queue from spinning the loop
                thread::sleep(timing.receive_timeout);
            }
        }
    }

    shared.set_state(DispatcherState::Stopped);
    debug!(client_queue = %transport.client_queue_name(), "Reply dispatcher stopped");
}
