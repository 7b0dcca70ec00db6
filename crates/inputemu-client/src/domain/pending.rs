//! Pending-Call Registry - maps request identifiers to callers awaiting replies.
//!
//! Flow:
//! 1. Caller picks a request identifier
//! 2. Caller calls `register_awaited()` to get a [`ReplyHandle`]
//! 3. Caller sends the request carrying the identifier
//! 4. Dispatcher receives the reply and calls `resolve()`
//! 5. Caller waits on the handle, then calls `forget()`
//!
//! Fire-logged entries skip steps 5: the dispatcher erases them itself when
//! their reply arrives. An entry whose reply never arrives stays until the
//! session is torn down; `pending_count()` makes that visible.
//!
//! `close()` sweeps the registry and refuses every later registration. Both
//! happen under the registry lock, so a registration either is swept or
//! fails; none can slip in after the sweep.

use inputemu_protocol::ReplyRecord;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// =============================================================================
// REPLY SLOT
// =============================================================================

enum SlotState {
    Waiting,
    Filled(ReplyRecord),
    Taken,
    Abandoned,
}

/// Single-use rendezvous between the dispatcher and one blocked caller.
struct ReplySlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl ReplySlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Waiting),
            ready: Condvar::new(),
        }
    }

    /// Returns false if the slot was already filled or abandoned.
    fn fill(&self, reply: ReplyRecord) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Waiting) {
            return false;
        }
        *state = SlotState::Filled(reply);
        self.ready.notify_one();
        true
    }

    fn abandon(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Waiting) {
            *state = SlotState::Abandoned;
            self.ready.notify_one();
        }
    }
}

/// Registration refused because the session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pending-call registry is closed")]
pub struct RegistryClosed;

/// Why a wait on a [`ReplyHandle`] ended without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The timeout elapsed first.
    TimedOut,
    /// The session was torn down while waiting.
    Abandoned,
}

/// Handle a blocking caller waits on for its reply.
pub struct ReplyHandle {
    request_id: u32,
    slot: Arc<ReplySlot>,
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl ReplyHandle {
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Block until the reply arrives, the timeout elapses, or the session is
    /// torn down. `None` waits without limit.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<ReplyRecord, WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.slot.state.lock();
        loop {
            match std::mem::replace(&mut *state, SlotState::Taken) {
                SlotState::Filled(reply) => return Ok(reply),
                SlotState::Abandoned => {
                    *state = SlotState::Abandoned;
                    return Err(WaitError::Abandoned);
                }
                SlotState::Taken => return Err(WaitError::Abandoned),
                SlotState::Waiting => *state = SlotState::Waiting,
            }
            match deadline {
                Some(deadline) => {
                    if self.slot.ready.wait_until(&mut state, deadline).timed_out()
                        && matches!(*state, SlotState::Waiting)
                    {
                        return Err(WaitError::TimedOut);
                    }
                }
                None => self.slot.ready.wait(&mut state),
            }
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

enum PendingEntry {
    /// A caller is blocked on the slot.
    Awaited {
        slot: Arc<ReplySlot>,
        operation: &'static str,
        registered_at: Instant,
    },
    /// Nobody waits; the reply is discarded on arrival.
    FireLogged {
        operation: &'static str,
        registered_at: Instant,
    },
}

impl PendingEntry {
    fn operation(&self) -> &'static str {
        match self {
            PendingEntry::Awaited { operation, .. } | PendingEntry::FireLogged { operation, .. } => {
                *operation
            }
        }
    }

    fn age(&self) -> Duration {
        match self {
            PendingEntry::Awaited { registered_at, .. }
            | PendingEntry::FireLogged { registered_at, .. } => registered_at.elapsed(),
        }
    }
}

/// What `resolve()` did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Handed to the blocked caller; the entry stays until the caller forgets it.
    Delivered,
    /// Matched a fire-logged entry, which was erased.
    Discarded,
    /// No entry for the identifier, or its caller already got a reply.
    Unmatched,
}

/// Statistics for the registry
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total entries registered (both kinds)
    pub total_registered: AtomicU64,
    /// Replies handed to blocked callers
    pub total_delivered: AtomicU64,
    /// Replies discarded for fire-logged entries
    pub total_discarded: AtomicU64,
    /// Replies with no matching entry
    pub total_unmatched: AtomicU64,
    /// Waits that ran out of time
    pub total_timeouts: AtomicU64,
    /// Entries dropped at session teardown
    pub total_abandoned: AtomicU64,
}

/// Mutex-protected map from request identifier to awaited-result slot.
///
/// The lock covers map lookup, insert and erase only. Callers wait on their
/// own [`ReplyHandle`], never on the registry lock.
pub struct PendingCallRegistry {
    entries: Mutex<HashMap<u32, PendingEntry>>,
    /// Only written while `entries` is locked
    closed: AtomicBool,
    stats: PendingStats,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stats: PendingStats::default(),
        }
    }

    /// Insert an awaited entry and return the handle to block on.
    ///
    /// A second registration under the same identifier replaces the first.
    pub fn register_awaited(
        &self,
        request_id: u32,
        operation: &'static str,
    ) -> Result<ReplyHandle, RegistryClosed> {
        let slot = Arc::new(ReplySlot::new());
        let entry = PendingEntry::Awaited {
            slot: Arc::clone(&slot),
            operation,
            registered_at: Instant::now(),
        };
        self.insert(request_id, entry)?;
        Ok(ReplyHandle { request_id, slot })
    }

    /// Insert an entry whose reply is expected but will be discarded.
    pub fn register_fire_logged(
        &self,
        request_id: u32,
        operation: &'static str,
    ) -> Result<(), RegistryClosed> {
        let entry = PendingEntry::FireLogged {
            operation,
            registered_at: Instant::now(),
        };
        self.insert(request_id, entry)
    }

    fn insert(&self, request_id: u32, entry: PendingEntry) -> Result<(), RegistryClosed> {
        let replaced = {
            let mut entries = self.entries.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(RegistryClosed);
            }
            entries.insert(request_id, entry)
        };
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = replaced {
            warn!(
                request_id,
                operation = old.operation(),
                "Request id reused while still pending, replacing entry"
            );
        }
        Ok(())
    }

    /// Route a reply to its entry.
    pub fn resolve(&self, reply: ReplyRecord) -> Resolution {
        let request_id = reply.request_id;
        let mut entries = self.entries.lock();
        let resolution = match entries.get(&request_id) {
            Some(PendingEntry::Awaited { slot, .. }) => {
                if slot.fill(reply) {
                    Resolution::Delivered
                } else {
                    Resolution::Unmatched
                }
            }
            Some(PendingEntry::FireLogged { .. }) => Resolution::Discarded,
            None => Resolution::Unmatched,
        };
        if resolution == Resolution::Discarded {
            entries.remove(&request_id);
        }
        drop(entries);

        match resolution {
            Resolution::Delivered => {
                self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
                trace!(request_id, "Delivered reply to waiting caller");
            }
            Resolution::Discarded => {
                self.stats.total_discarded.fetch_add(1, Ordering::Relaxed);
                trace!(request_id, "Discarded reply for fire-logged request");
            }
            Resolution::Unmatched => {
                self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
                debug!(request_id, "Reply for unknown or already answered request id");
            }
        }
        resolution
    }

    /// Erase an entry. Returns true if it existed.
    pub fn forget(&self, request_id: u32) -> bool {
        self.entries.lock().remove(&request_id).is_some()
    }

    /// Erase an awaited entry whose wait timed out.
    pub(crate) fn expire(&self, request_id: u32) {
        if let Some(entry) = self.entries.lock().remove(&request_id) {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                request_id,
                operation = entry.operation(),
                waited_ms = entry.age().as_millis() as u64,
                "Gave up waiting for reply"
            );
        }
    }

    /// Drop every entry, waking blocked callers with [`WaitError::Abandoned`].
    ///
    /// Returns the number of entries dropped.
    pub fn abandon_all(&self) -> usize {
        self.sweep(false)
    }

    /// Refuse all further registrations, then abandon every entry.
    ///
    /// Returns the number of entries dropped.
    pub fn close(&self) -> usize {
        self.sweep(true)
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn sweep(&self, close: bool) -> usize {
        let drained: Vec<(u32, PendingEntry)> = {
            let mut entries = self.entries.lock();
            if close {
                self.closed.store(true, Ordering::Release);
            }
            entries.drain().collect()
        };
        for (request_id, entry) in &drained {
            if let PendingEntry::Awaited { slot, .. } = entry {
                slot.abandon();
            }
            debug!(
                request_id = *request_id,
                operation = entry.operation(),
                "Abandoned pending call"
            );
        }
        self.stats
            .total_abandoned
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained.len()
    }

    /// Check if a request identifier is pending
    pub fn is_pending(&self, request_id: u32) -> bool {
        self.entries.lock().contains_key(&request_id)
    }

    /// Number of entries currently held
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputemu_protocol::{ReplyPayload, ReplyStatus};
    use std::thread;

    fn reply(request_id: u32) -> ReplyRecord {
        ReplyRecord::new(request_id, ReplyStatus::Ok, ReplyPayload::Generic)
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = PendingCallRegistry::new();

        let handle = registry.register_awaited(42, "ping").unwrap();
        assert!(registry.is_pending(42));
        assert_eq!(registry.pending_count(), 1);

        assert_eq!(registry.resolve(reply(42)), Resolution::Delivered);
        let received = handle.wait(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(received.request_id, 42);

        // entry stays until the caller erases it
        assert!(registry.is_pending(42));
        assert!(registry.forget(42));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let registry = PendingCallRegistry::new();
        let _handle = registry.register_awaited(1, "ping").unwrap();

        assert_eq!(registry.resolve(reply(2)), Resolution::Unmatched);
        assert_eq!(registry.pending_count(), 1);
        assert_eq!(registry.stats().total_unmatched.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_duplicate_reply_is_not_delivered_twice() {
        let registry = PendingCallRegistry::new();
        let handle = registry.register_awaited(5, "ping").unwrap();

        assert_eq!(registry.resolve(reply(5)), Resolution::Delivered);
        assert_eq!(registry.resolve(reply(5)), Resolution::Unmatched);
        assert!(handle.wait(Some(Duration::from_millis(10))).is_ok());
        assert_eq!(registry.stats().total_delivered.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fire_logged_removed_on_reply_only() {
        let registry = PendingCallRegistry::new();
        registry.register_fire_logged(9, "set_device_normal_mode").unwrap();

        // never removed before its reply
        assert!(registry.is_pending(9));
        assert_eq!(registry.resolve(reply(10)), Resolution::Unmatched);
        assert!(registry.is_pending(9));

        assert_eq!(registry.resolve(reply(9)), Resolution::Discarded);
        assert!(!registry.is_pending(9));
        assert_eq!(registry.resolve(reply(9)), Resolution::Unmatched);
    }

    #[test]
    fn test_wait_times_out() {
        let registry = PendingCallRegistry::new();
        let handle = registry.register_awaited(3, "ping").unwrap();

        let started = Instant::now();
        assert_eq!(
            handle.wait(Some(Duration::from_millis(20))).unwrap_err(),
            WaitError::TimedOut
        );
        assert!(started.elapsed() >= Duration::from_millis(20));

        registry.expire(3);
        assert!(!registry.is_pending(3));
        assert_eq!(registry.stats().total_timeouts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_wait_wakes_on_reply_from_other_thread() {
        let registry = Arc::new(PendingCallRegistry::new());
        let handle = registry.register_awaited(77, "get_device_info").unwrap();

        let resolver = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                registry.resolve(reply(77))
            })
        };

        let received = handle.wait(None).unwrap();
        assert_eq!(received.request_id, 77);
        assert_eq!(resolver.join().unwrap(), Resolution::Delivered);
    }

    #[test]
    fn test_abandon_all_wakes_waiters() {
        let registry = Arc::new(PendingCallRegistry::new());
        let handle = registry.register_awaited(11, "ping").unwrap();
        registry.register_fire_logged(12, "ping").unwrap();

        let waiter = thread::spawn(move || handle.wait(None));
        thread::sleep(Duration::from_millis(10));

        assert_eq!(registry.abandon_all(), 2);
        assert_eq!(waiter.join().unwrap().unwrap_err(), WaitError::Abandoned);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_close_refuses_later_registrations() {
        let registry = Arc::new(PendingCallRegistry::new());
        let handle = registry.register_awaited(21, "ping").unwrap();
        let waiter = thread::spawn(move || handle.wait(None));

        assert_eq!(registry.close(), 1);
        assert!(registry.is_closed());
        assert_eq!(waiter.join().unwrap().unwrap_err(), WaitError::Abandoned);

        assert_eq!(
            registry.register_awaited(22, "ping").unwrap_err(),
            RegistryClosed
        );
        assert_eq!(
            registry.register_fire_logged(23, "ping").unwrap_err(),
            RegistryClosed
        );
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.stats().total_registered.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_registration_racing_close_is_swept_or_refused() {
        for _ in 0..50 {
            let registry = Arc::new(PendingCallRegistry::new());
            let registrar = {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register_awaited(5, "ping"))
            };
            registry.close();

            // either refused outright or woken by the sweep, never left waiting
            if let Ok(handle) = registrar.join().unwrap() {
                assert_eq!(
                    handle.wait(Some(Duration::from_secs(1))).unwrap_err(),
                    WaitError::Abandoned
                );
            }
            assert_eq!(registry.pending_count(), 0);
        }
    }

    #[test]
    fn test_reregistration_replaces_entry() {
        let registry = PendingCallRegistry::new();
        let _first = registry.register_awaited(8, "ping").unwrap();
        let second = registry.register_awaited(8, "ping").unwrap();

        assert_eq!(registry.pending_count(), 1);
        assert_eq!(registry.resolve(reply(8)), Resolution::Delivered);
        assert!(second.wait(Some(Duration::from_millis(10))).is_ok());
    }

    #[test]
    fn test_stats() {
        let registry = PendingCallRegistry::new();
        let _h = registry.register_awaited(1, "ping").unwrap();
        registry.register_fire_logged(2, "ping").unwrap();

        assert_eq!(registry.stats().total_registered.load(Ordering::Relaxed), 2);

        registry.resolve(reply(2));
        assert_eq!(registry.stats().total_discarded.load(Ordering::Relaxed), 1);
    }
}
