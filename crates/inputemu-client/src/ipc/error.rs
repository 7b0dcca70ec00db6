//! Transport error types.

use inputemu_protocol::WireError;

/// Errors raised by queue backends and the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),
    #[error("queue '{0}' is full")]
    QueueFull(String),
    #[error("queue '{0}' is closed")]
    QueueClosed(String),
    #[error("could not create queue '{queue}': {reason}")]
    CreateFailed { queue: String, reason: String },
    #[error("could not open queue '{queue}': {reason}")]
    OpenFailed { queue: String, reason: String },
    #[error("record of {size} bytes exceeds queue record size {max}")]
    RecordTooLarge { size: usize, max: usize },
    #[error("queue i/o on '{queue}' failed: {reason}")]
    Io { queue: String, reason: String },
    #[error("malformed record: {0}")]
    Wire(#[from] WireError),
}
