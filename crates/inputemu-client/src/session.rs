//! Session Manager - one connect-to-disconnect lifetime.
//!
//! A [`Session`] only exists once the handshake succeeded. Establishing one
//! either yields a fully connected session or rolls back everything it set up:
//! the dispatcher is joined and the reply queue removed before the error is
//! returned.
//!
//! ## Teardown order
//!
//! 1. Notify the server (bounded, best effort)
//! 2. Stop and join the dispatcher
//! 3. Close the registry: blocked callers wake, later calls fail unsent
//! 4. Remove the reply queue

use crate::domain::config::ClientConfig;
use crate::domain::correlation::RequestIdGenerator;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::pending::PendingCallRegistry;
use crate::invoker::CallInvoker;
use crate::ipc::dispatcher::{DispatcherTiming, ReplyDispatcher};
use crate::ipc::queue::QueueProvider;
use crate::ipc::transport::Transport;
use inputemu_protocol::{QueueName, ReplyPayload, ReplyStatus, RequestPayload, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Session {
    transport: Arc<Transport>,
    dispatcher: ReplyDispatcher,
    invoker: CallInvoker,
    disconnect_timeout: Duration,
    server_version: u32,
    closed: AtomicBool,
}

impl Session {
    /// Open the queues, start the dispatcher and perform the handshake.
    pub fn establish(provider: Arc<dyn QueueProvider>, config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let transport = Arc::new(Transport::open(
            provider,
            &config.server_queue_name,
            &config.client_queue_name,
            config.queue_capacity,
        )?);
        let registry = Arc::new(PendingCallRegistry::new());

        let dispatcher = ReplyDispatcher::spawn(
            Arc::clone(&transport),
            Arc::clone(&registry),
            DispatcherTiming {
                receive_timeout: config.receive_timeout,
                idle_sleep: config.idle_sleep,
            },
        )
        .map_err(|e| {
            transport.close();
            ClientError::Connection(format!("could not start reply dispatcher: {e}"))
        })?;

        let invoker = CallInvoker::new(
            Arc::clone(&transport),
            registry,
            RequestIdGenerator::new(config.request_ids),
            config.call_timeout,
        );

        let mut session = Self {
            transport,
            dispatcher,
            invoker,
            disconnect_timeout: config.disconnect_timeout,
            server_version: PROTOCOL_VERSION,
            closed: AtomicBool::new(false),
        };

        // drop runs local teardown on the error path
        let (client_id, server_version) = session.handshake(config.handshake_timeout)?;
        session.invoker.set_client_id(client_id);
        session.server_version = server_version;

        info!(
            client_id,
            client_queue = %session.transport.client_queue_name(),
            "Connected to driver"
        );
        Ok(session)
    }

    fn handshake(&self, timeout: Duration) -> ClientResult<(u32, u32)> {
        let queue_name = QueueName::new(self.transport.client_queue_name())
            .map_err(|e| ClientError::Connection(format!("invalid client queue name: {e}")))?;
        let payload = RequestPayload::ClientConnect {
            protocol_version: PROTOCOL_VERSION,
            queue_name,
        };

        let reply = self.invoker.exchange(payload, Some(timeout)).map_err(|e| match e {
            ClientError::Timeout { .. } => {
                ClientError::Connection(format!("no handshake reply within {timeout:?}"))
            }
            other => other,
        })?;

        match (reply.status, reply.payload) {
            (
                ReplyStatus::Ok,
                ReplyPayload::ClientConnect {
                    client_id,
                    protocol_version,
                },
            ) => Ok((client_id, protocol_version)),
            (ReplyStatus::Ok, other) => Err(ClientError::Connection(format!(
                "unexpected handshake reply payload: {other:?}"
            ))),
            (ReplyStatus::InvalidVersion, payload) => {
                let server_version = match payload {
                    ReplyPayload::ClientConnect {
                        protocol_version, ..
                    } => protocol_version,
                    _ => 0,
                };
                Err(ClientError::InvalidVersion {
                    server_version,
                    client_version: PROTOCOL_VERSION,
                })
            }
            (status, _) => Err(ClientError::Connection(format!(
                "connection rejected by server: {status}"
            ))),
        }
    }

    /// Identifier the server assigned during the handshake.
    pub fn client_id(&self) -> u32 {
        self.invoker.client_id()
    }

    /// Protocol version the server reported.
    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    pub fn client_queue_name(&self) -> &str {
        self.transport.client_queue_name()
    }

    pub fn invoker(&self) -> &CallInvoker {
        &self.invoker
    }

    pub fn registry(&self) -> &PendingCallRegistry {
        self.invoker.registry()
    }

    /// Registry entries still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.registry().pending_count()
    }

    pub fn dispatcher(&self) -> &ReplyDispatcher {
        &self.dispatcher
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Notify the server and release local resources. Idempotent.
    ///
    /// Local teardown completes whatever the server answers, or if it does
    /// not answer within the disconnect timeout.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self
            .invoker
            .exchange(RequestPayload::ClientDisconnect, Some(self.disconnect_timeout))
        {
            Ok(reply) if reply.status.is_ok() => debug!("Server acknowledged disconnect"),
            Ok(reply) => warn!(status = %reply.status, "Server rejected disconnect"),
            Err(e) => warn!(error = %e, "No disconnect acknowledgement"),
        }
        self.release();
        info!(client_id = self.client_id(), "Disconnected from driver");
    }

    fn release(&self) {
        self.dispatcher.stop();
        // calls that register after this point fail instead of waiting
        let abandoned = self.registry().close();
        if abandoned > 0 {
            debug!(abandoned, "Dropped pending calls at teardown");
        }
        self.transport.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.release();
        }
    }
}
