//! Client error taxonomy and the single reply-status mapping.

use crate::domain::config::ConfigError;
use crate::ipc::error::TransportError;
use inputemu_protocol::ReplyStatus;
use std::time::Duration;

/// Errors surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No active session, queue open/create failure, or handshake rejected
    /// for a reason other than the protocol version.
    #[error("connection error: {0}")]
    Connection(String),

    /// Client and server speak different protocol versions.
    #[error("incompatible ipc protocol versions (server: {server_version}, client: {client_version})")]
    InvalidVersion {
        server_version: u32,
        client_version: u32,
    },

    /// Target identifier unrecognized or malformed.
    #[error("{context}: invalid id")]
    InvalidId { context: String },

    /// Target identifier well-formed but the entity does not exist.
    #[error("{context}: not found")]
    NotFound { context: String },

    /// Any other non-Ok status.
    #[error("{context}: server returned {status}")]
    Protocol {
        context: String,
        status: ReplyStatus,
    },

    /// Queue full, queue closed, or malformed record on the send path.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered Ok with a payload the operation cannot use.
    #[error("{context}: unexpected reply payload {payload}")]
    UnexpectedReply { context: String, payload: String },

    /// No reply arrived within the per-call timeout.
    #[error("{context}: no reply within {timeout:?}")]
    Timeout { context: String, timeout: Duration },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Map a reply status to an error. Returns `None` for `Ok`.
    ///
    /// `InvalidVersion` is only meaningful during the handshake, which handles
    /// it itself; everywhere else it is reported as a protocol error.
    pub fn from_status(status: ReplyStatus, context: &str) -> Option<Self> {
        match status {
            ReplyStatus::Ok => None,
            ReplyStatus::InvalidId => Some(ClientError::InvalidId {
                context: context.to_string(),
            }),
            ReplyStatus::NotFound => Some(ClientError::NotFound {
                context: context.to_string(),
            }),
            other => Some(ClientError::Protocol {
                context: context.to_string(),
                status: other,
            }),
        }
    }

    pub(crate) fn unexpected_reply(context: &str, payload: &impl std::fmt::Debug) -> Self {
        ClientError::UnexpectedReply {
            context: context.to_string(),
            payload: format!("{payload:?}"),
        }
    }

    pub(crate) fn no_session() -> Self {
        ClientError::Connection("no active connection".into())
    }

    /// Raw status code, for errors that came from a reply.
    pub fn status_code(&self) -> Option<u32> {
        match self {
            ClientError::InvalidId { .. } => Some(ReplyStatus::InvalidId.code()),
            ClientError::NotFound { .. } => Some(ReplyStatus::NotFound.code()),
            ClientError::InvalidVersion { .. } => Some(ReplyStatus::InvalidVersion.code()),
            ClientError::Protocol { status, .. } => Some(status.code()),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
