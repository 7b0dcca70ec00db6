//! # InputEmu Protocol
//!
//! Wire records exchanged between the client engine and the driver over the
//! two message queues.
//!
//! ## Record Layout
//!
//! ```text
//! RequestRecord (RECORD_SIZE bytes, zero padded)
//! ┌──────────────┬────────────┬───────────┬────────┬─────────────────────┐
//! │ timestamp_ms │ request_id │ client_id │ opcode │ payload (per opcode) │
//! │     u64      │    u32     │    u32    │  u32   │                     │
//! └──────────────┴────────────┴───────────┴────────┴─────────────────────┘
//!
//! ReplyRecord (RECORD_SIZE bytes, zero padded)
//! ┌──────────────┬────────────┬────────┬──────┬──────────────────────────┐
//! │ timestamp_ms │ request_id │ status │ kind │ payload (per reply kind) │
//! │     u64      │    u32     │  u32   │ u32  │                          │
//! └──────────────┴────────────┴────────┴──────┴──────────────────────────┘
//! ```
//!
//! Every record has the same size regardless of opcode so that a queue can be
//! created with a uniform maximum message size. A `request_id` of zero tells
//! the driver not to reply.

pub mod codec;
pub mod device;
pub mod records;
pub mod status;

pub use codec::{decode_reply, decode_request, encode_reply, encode_request, WireError};
pub use device::{
    DeviceClass, DeviceInfo, MotionCompensationProperties, MotionCompensationVelAccMode,
};
pub use records::{
    QueueName, ReplyPayload, ReplyRecord, RequestPayload, RequestRecord, EVENT_DATA_LEN,
    QUEUE_NAME_LEN,
};
pub use status::ReplyStatus;

/// Protocol version sent in the handshake. The driver rejects any other value.
pub const PROTOCOL_VERSION: u32 = 3;

/// Size in bytes of every record on either queue.
pub const RECORD_SIZE: usize = 256;

/// Request identifier reserved for "the server must not reply".
pub const NO_REPLY: u32 = 0;

/// Milliseconds since the Unix epoch, used to stamp outgoing records.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
