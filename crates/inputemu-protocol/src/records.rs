//! # Request and Reply Records
//!
//! The tagged unions carried on the queues. The variant index of
//! [`RequestPayload`] is the opcode; the variant index of [`ReplyPayload`] is
//! the reply kind.

use crate::codec::WireError;
use crate::device::{DeviceInfo, MotionCompensationProperties, MotionCompensationVelAccMode};
use crate::status::ReplyStatus;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

/// Size of the fixed queue name field in the handshake, terminator included.
pub const QUEUE_NAME_LEN: usize = 128;

/// Size of the opaque vendor event data block.
pub const EVENT_DATA_LEN: usize = 32;

// =============================================================================
// QUEUE NAME
// =============================================================================

/// Null-terminated, fixed-width queue name as sent in the handshake.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueName(#[serde_as(as = "Bytes")] [u8; QUEUE_NAME_LEN]);

impl QueueName {
    /// Encode `name`, rejecting names that would not fit with their
    /// terminator or that contain an interior NUL.
    pub fn new(name: &str) -> Result<Self, WireError> {
        let bytes = name.as_bytes();
        if bytes.len() >= QUEUE_NAME_LEN {
            return Err(WireError::QueueNameTooLong {
                len: bytes.len(),
                max: QUEUE_NAME_LEN - 1,
            });
        }
        if bytes.contains(&0) {
            return Err(WireError::QueueNameNul);
        }
        let mut field = [0u8; QUEUE_NAME_LEN];
        field[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(field))
    }

    /// The name up to the first NUL. Invalid UTF-8 is replaced.
    pub fn as_string(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(QUEUE_NAME_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueueName").field(&self.as_string()).finish()
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// A record sent on the server queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Correlates the reply. Zero means the server must not reply.
    pub request_id: u32,
    /// Client identifier assigned during the handshake. Zero before that.
    pub client_id: u32,
    pub payload: RequestPayload,
}

impl RequestRecord {
    pub fn new(request_id: u32, client_id: u32, payload: RequestPayload) -> Self {
        Self {
            timestamp_ms: crate::now_millis(),
            request_id,
            client_id,
            payload,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.request_id != crate::NO_REPLY
    }
}

/// Operation requested from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    None,
    ClientConnect {
        protocol_version: u32,
        queue_name: QueueName,
    },
    ClientDisconnect,
    Ping {
        nonce: u64,
    },
    GetDeviceInfo {
        device_id: u32,
    },
    VendorSpecificEvent {
        device_id: u32,
        event_type: u32,
        event_data: [u8; EVENT_DATA_LEN],
        time_offset: f64,
    },
    SetDeviceNormalMode {
        device_id: u32,
    },
    SetMotionCompensationMode {
        device_id: u32,
        vel_acc_mode: MotionCompensationVelAccMode,
    },
    SetMotionCompensationProperties(MotionCompensationProperties),
}

impl RequestPayload {
    /// Opcode name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            RequestPayload::None => "none",
            RequestPayload::ClientConnect { .. } => "client_connect",
            RequestPayload::ClientDisconnect => "client_disconnect",
            RequestPayload::Ping { .. } => "ping",
            RequestPayload::GetDeviceInfo { .. } => "get_device_info",
            RequestPayload::VendorSpecificEvent { .. } => "vendor_specific_event",
            RequestPayload::SetDeviceNormalMode { .. } => "set_device_normal_mode",
            RequestPayload::SetMotionCompensationMode { .. } => "set_motion_compensation_mode",
            RequestPayload::SetMotionCompensationProperties(_) => {
                "set_motion_compensation_properties"
            }
        }
    }
}

// =============================================================================
// REPLIES
// =============================================================================

/// A record received on the client queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Identifier of the request being answered.
    pub request_id: u32,
    pub status: ReplyStatus,
    pub payload: ReplyPayload,
}

impl ReplyRecord {
    pub fn new(request_id: u32, status: ReplyStatus, payload: ReplyPayload) -> Self {
        Self {
            timestamp_ms: crate::now_millis(),
            request_id,
            status,
            payload,
        }
    }
}

/// Reply body, matching the originating request's opcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyPayload {
    None,
    ClientConnect { client_id: u32, protocol_version: u32 },
    Ping { nonce: u64 },
    Generic,
    DeviceInfo(DeviceInfo),
}
