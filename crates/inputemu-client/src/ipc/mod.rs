//! IPC layer: queue backends, the session transport and the reply dispatcher.

pub mod dispatcher;
pub mod error;
#[cfg(target_os = "linux")]
pub mod posix;
pub mod queue;
pub mod transport;

pub use dispatcher::{DispatcherState, DispatcherStats, DispatcherTiming, ReplyDispatcher};
pub use error::TransportError;
#[cfg(target_os = "linux")]
pub use posix::{PosixQueue, PosixQueueProvider};
pub use queue::{MemoryQueue, MemoryQueueProvider, MessageQueue, QueueProvider};
pub use transport::{Received, Transport};
