//! Client façade: connection state plus the session it currently owns.

use crate::domain::config::ClientConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::ipc::queue::QueueProvider;
use crate::session::Session;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where the client is in its connect/disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Connection to the input-emulator driver.
///
/// Safe to share between threads: any number of callers may issue calls
/// concurrently while connect and disconnect are serialized.
pub struct InputEmulatorClient {
    config: ClientConfig,
    provider: Arc<dyn QueueProvider>,
    /// Serializes connect and disconnect
    lifecycle: Mutex<()>,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Arc<Session>>>,
}

impl InputEmulatorClient {
    /// Client using the given queue backend.
    pub fn with_provider(config: ClientConfig, provider: Arc<dyn QueueProvider>) -> Self {
        Self {
            config,
            provider,
            lifecycle: Mutex::new(()),
            state: Mutex::new(ConnectionState::Disconnected),
            session: Mutex::new(None),
        }
    }

    /// Client using POSIX message queues.
    ///
    /// The default `queue_capacity` of 100 is above the kernel's default
    /// `/proc/sys/fs/mqueue/msg_max` of 10. Unless that limit is raised,
    /// lower the capacity or `connect()` fails to create the reply queue.
    #[cfg(target_os = "linux")]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_provider(config, Arc::new(crate::ipc::posix::PosixQueueProvider::new()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the driver. Does nothing when already connected.
    pub fn connect(&self) -> ClientResult<()> {
        let _guard = self.lifecycle.lock();
        if self.session.lock().is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        match Session::establish(Arc::clone(&self.provider), &self.config) {
            Ok(session) => {
                *self.session.lock() = Some(Arc::new(session));
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Disconnect from the driver. Idempotent.
    pub fn disconnect(&self) {
        let _guard = self.lifecycle.lock();
        let Some(session) = self.session.lock().take() else {
            return;
        };

        self.set_state(ConnectionState::Disconnecting);
        session.disconnect();
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Client identifier of the current session.
    pub fn client_id(&self) -> Option<u32> {
        self.session.lock().as_ref().map(|s| s.client_id())
    }

    /// Reply queue name of the current session.
    pub fn client_queue_name(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.client_queue_name().to_string())
    }

    /// Pending-call entries of the current session; zero when disconnected.
    pub fn pending_count(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map_or(0, |s| s.pending_count())
    }

    /// The current session, or a connection error when there is none.
    pub fn session(&self) -> ClientResult<Arc<Session>> {
        self.session
            .lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(ClientError::no_session)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        debug!(from = %*current, to = %state, "Connection state change");
        *current = state;
    }
}

impl Drop for InputEmulatorClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
