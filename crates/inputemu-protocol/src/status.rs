//! # Reply Status
//!
//! Status code carried by every reply. Travels as a raw `u32` so that codes
//! added by a newer driver still decode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome reported by the driver for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ReplyStatus {
    None,
    Ok,
    UnknownError,
    InvalidId,
    AlreadyInUse,
    InvalidType,
    NotFound,
    TooManyDevices,
    InvalidVersion,
    MissingProperty,
    InvalidOperation,
    NotTracking,
    /// A code this client does not know about.
    Other(u32),
}

impl ReplyStatus {
    /// Raw wire code.
    pub fn code(self) -> u32 {
        u32::from(self)
    }

    pub fn is_ok(self) -> bool {
        self == ReplyStatus::Ok
    }
}

impl From<u32> for ReplyStatus {
    fn from(code: u32) -> Self {
        match code {
            0 => ReplyStatus::None,
            1 => ReplyStatus::Ok,
            2 => ReplyStatus::UnknownError,
            3 => ReplyStatus::InvalidId,
            4 => ReplyStatus::AlreadyInUse,
            5 => ReplyStatus::InvalidType,
            6 => ReplyStatus::NotFound,
            7 => ReplyStatus::TooManyDevices,
            8 => ReplyStatus::InvalidVersion,
            9 => ReplyStatus::MissingProperty,
            10 => ReplyStatus::InvalidOperation,
            11 => ReplyStatus::NotTracking,
            other => ReplyStatus::Other(other),
        }
    }
}

impl From<ReplyStatus> for u32 {
    fn from(status: ReplyStatus) -> Self {
        match status {
            ReplyStatus::None => 0,
            ReplyStatus::Ok => 1,
            ReplyStatus::UnknownError => 2,
            ReplyStatus::InvalidId => 3,
            ReplyStatus::AlreadyInUse => 4,
            ReplyStatus::InvalidType => 5,
            ReplyStatus::NotFound => 6,
            ReplyStatus::TooManyDevices => 7,
            ReplyStatus::InvalidVersion => 8,
            ReplyStatus::MissingProperty => 9,
            ReplyStatus::InvalidOperation => 10,
            ReplyStatus::NotTracking => 11,
            ReplyStatus::Other(code) => code,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyStatus::Other(code) => write!(f, "status code {}", code),
            known => write!(f, "{:?} ({})", known, known.code()),
        }
    }
}
