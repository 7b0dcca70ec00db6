//! Domain layer for the client engine.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;

pub use config::{ClientConfig, ConfigError, RequestIdStrategy};
pub use correlation::RequestIdGenerator;
pub use error::{ClientError, ClientResult};
pub use pending::{
    PendingCallRegistry, PendingStats, RegistryClosed, ReplyHandle, Resolution, WaitError,
};
