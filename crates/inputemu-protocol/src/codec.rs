//! # Record Codec
//!
//! Serializes records with fixed-width little-endian integers and pads every
//! record to [`RECORD_SIZE`]. Decoding refuses buffers of any other length.

use crate::records::{ReplyRecord, RequestRecord};
use crate::RECORD_SIZE;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while encoding or decoding wire records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Buffer length differs from the fixed record size.
    #[error("record size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Encoded body does not fit in a record.
    #[error("record too large: {size} bytes exceeds {max}")]
    RecordTooLarge { size: usize, max: usize },

    /// Queue name does not fit the handshake field.
    #[error("queue name too long: {len} bytes, at most {max} allowed")]
    QueueNameTooLong { len: usize, max: usize },

    /// Queue name contains an interior NUL byte.
    #[error("queue name contains a NUL byte")]
    QueueNameNul,

    /// Unknown motion compensation mode code.
    #[error("unknown velocity/acceleration compensation mode: {0}")]
    UnknownVelAccMode(u32),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, WireError> {
    let mut bytes = options()
        .serialize(record)
        .map_err(|e| WireError::Encode(e.to_string()))?;
    if bytes.len() > RECORD_SIZE {
        return Err(WireError::RecordTooLarge {
            size: bytes.len(),
            max: RECORD_SIZE,
        });
    }
    bytes.resize(RECORD_SIZE, 0);
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    if bytes.len() != RECORD_SIZE {
        return Err(WireError::SizeMismatch {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        });
    }
    options()
        .deserialize(bytes)
        .map_err(|e| WireError::Decode(e.to_string()))
}

/// Encode a request into a full-size record.
pub fn encode_request(record: &RequestRecord) -> Result<Vec<u8>, WireError> {
    encode(record)
}

/// Decode a full-size request record.
pub fn decode_request(bytes: &[u8]) -> Result<RequestRecord, WireError> {
    decode(bytes)
}

/// Encode a reply into a full-size record.
pub fn encode_reply(record: &ReplyRecord) -> Result<Vec<u8>, WireError> {
    encode(record)
}

/// Decode a full-size reply record.
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyRecord, WireError> {
    decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceClass, DeviceInfo, MotionCompensationProperties};
    use crate::records::{QueueName, ReplyPayload, RequestPayload, QUEUE_NAME_LEN};
    use crate::status::ReplyStatus;
    use crate::PROTOCOL_VERSION;
    use proptest::prelude::*;

    fn handshake(name: &str) -> RequestRecord {
        RequestRecord::new(
            17,
            0,
            RequestPayload::ClientConnect {
                protocol_version: PROTOCOL_VERSION,
                queue_name: QueueName::new(name).unwrap(),
            },
        )
    }

    #[test]
    fn test_every_request_is_record_sized() {
        let longest_name = "n".repeat(QUEUE_NAME_LEN - 1);
        let requests = [
            handshake(&longest_name),
            RequestRecord::new(1, 2, RequestPayload::ClientDisconnect),
            RequestRecord::new(
                0,
                2,
                RequestPayload::VendorSpecificEvent {
                    device_id: 1,
                    event_type: 1000,
                    event_data: [0xAB; crate::EVENT_DATA_LEN],
                    time_offset: -0.25,
                },
            ),
            RequestRecord::new(
                3,
                2,
                RequestPayload::SetMotionCompensationProperties(MotionCompensationProperties {
                    vel_acc_mode: Some(crate::MotionCompensationVelAccMode::KalmanFilter),
                    kalman_process_noise: Some(0.1),
                    kalman_observation_noise: Some(0.2),
                    moving_average_window: Some(3),
                }),
            ),
        ];
        for request in &requests {
            let bytes = encode_request(request).unwrap();
            assert_eq!(bytes.len(), RECORD_SIZE);
            assert_eq!(&decode_request(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn test_reply_with_device_info() {
        let reply = ReplyRecord::new(
            99,
            ReplyStatus::Ok,
            ReplyPayload::DeviceInfo(DeviceInfo {
                device_id: 4,
                device_class: DeviceClass::Controller,
                device_mode: 1,
                ref_device_id: 0,
            }),
        );
        let bytes = encode_reply(&reply).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = decode_reply(&[0u8; RECORD_SIZE - 1]).unwrap_err();
        assert_eq!(
            err,
            WireError::SizeMismatch {
                expected: RECORD_SIZE,
                actual: RECORD_SIZE - 1
            }
        );
    }

    #[test]
    fn test_garbage_reply_kind_rejected() {
        let mut bytes = encode_reply(&ReplyRecord::new(5, ReplyStatus::Ok, ReplyPayload::Generic))
            .unwrap();
        // reply kind tag sits after timestamp (8), request id (4) and status (4)
        bytes[16..20].copy_from_slice(&900u32.to_le_bytes());
        assert!(matches!(decode_reply(&bytes), Err(WireError::Decode(_))));
    }

    #[test]
    fn test_request_and_reply_share_timestamp_encoding() {
        let timestamp_ms = u64::MAX - 1;
        let mut request = RequestRecord::new(5, 2, RequestPayload::Ping { nonce: 1 });
        request.timestamp_ms = timestamp_ms;
        let mut reply = ReplyRecord::new(5, ReplyStatus::Ok, ReplyPayload::Ping { nonce: 1 });
        reply.timestamp_ms = timestamp_ms;

        let request_bytes = encode_request(&request).unwrap();
        let reply_bytes = encode_reply(&reply).unwrap();
        assert_eq!(request_bytes[..8], timestamp_ms.to_le_bytes());
        assert_eq!(request_bytes[..8], reply_bytes[..8]);
        assert_eq!(decode_request(&request_bytes).unwrap().timestamp_ms, timestamp_ms);
    }

    #[test]
    fn test_unknown_status_survives_decoding() {
        let reply = ReplyRecord::new(5, ReplyStatus::Other(1234), ReplyPayload::Generic);
        let decoded = decode_reply(&encode_reply(&reply).unwrap()).unwrap();
        assert_eq!(decoded.status, ReplyStatus::Other(1234));
    }

    proptest! {
        #[test]
        fn prop_random_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), RECORD_SIZE)) {
            let _ = decode_reply(&bytes);
            let _ = decode_request(&bytes);
        }

        #[test]
        fn prop_ping_request_id_preserved(request_id in any::<u32>(), nonce in any::<u64>()) {
            let request = RequestRecord::new(request_id, 1, RequestPayload::Ping { nonce });
            let decoded = decode_request(&encode_request(&request).unwrap()).unwrap();
            prop_assert_eq!(decoded.request_id, request_id);
            prop_assert_eq!(decoded.payload, RequestPayload::Ping { nonce });
        }
    }
}
