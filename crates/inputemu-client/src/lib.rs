//! InputEmu Client - request/reply engine for the input-emulator driver.
//!
//! The driver listens on one well-known message queue. Each client session
//! creates a private reply queue, announces it in a handshake, and from then
//! on multiplexes any number of concurrent calls over the pair.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        InputEmulatorClient                           │
//! │        connect / disconnect, driver operations (device.rs)           │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐        ┌──────────────────────────────┐  │
//! │  │      Call Invoker      │        │       Session Manager        │  │
//! │  │ blocking / fire-and-   │        │ handshake, teardown order,   │  │
//! │  │ forget / discarded     │        │ owns everything below        │  │
//! │  └───────────┬────────────┘        └──────────────────────────────┘  │
//! │              │ register                      ▲ resolve              │
//! │  ┌───────────▼───────────────────────────────┴──────────────────┐   │
//! │  │                  Pending-Call Registry                        │   │
//! │  │          request id → Awaited slot | Fire-logged              │   │
//! │  └───────────────────────────────────────────────────────────────┘   │
//! │              │ send                          ▲ receive (50ms)       │
//! │  ┌───────────▼────────────┐        ┌─────────┴────────────────────┐  │
//! │  │  Transport (outbound)  │        │  Reply Dispatcher (thread)   │  │
//! └──┴───────────┬────────────┴────────┴─────────▲────────────────────┴──┘
//!                │ server queue                  │ client queue.<suffix>
//!                ▼                               │
//!                        input-emulator driver
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use inputemu_client::{CallMode, ClientConfig, InputEmulatorClient};
//!
//! let client = InputEmulatorClient::new(ClientConfig::from_env()?);
//! client.connect()?;
//! let info = client.get_device_info(0)?;
//! client.set_device_normal_mode(info.device_id, CallMode::Blocking)?;
//! client.disconnect();
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod device;
pub mod domain;
pub mod invoker;
pub mod ipc;
pub mod session;
pub mod telemetry;

pub use client::{ConnectionState, InputEmulatorClient};
pub use domain::{
    ClientConfig, ClientError, ClientResult, ConfigError, PendingCallRegistry, PendingStats,
    RequestIdStrategy,
};
pub use invoker::{CallInvoker, CallMode};
pub use ipc::{MemoryQueueProvider, MessageQueue, QueueProvider, TransportError};
#[cfg(target_os = "linux")]
pub use ipc::PosixQueueProvider;
pub use session::Session;
pub use telemetry::{init_logging, LogConfig, TelemetryError};

pub use inputemu_protocol as protocol;
pub use inputemu_protocol::{
    DeviceClass, DeviceInfo, MotionCompensationProperties, MotionCompensationVelAccMode,
    ReplyStatus, PROTOCOL_VERSION,
};
