//! Call Invoker - the three calling conventions every operation goes through.
//!
//! | Mode                       | Request id | Registry entry | Returns          |
//! |----------------------------|------------|----------------|------------------|
//! | `Blocking`                 | random     | Awaited        | after the reply  |
//! | `FireAndForget`            | 0          | none           | after the send   |
//! | `FireWithDiscardedReply`   | random     | Fire-logged    | after the send   |
//!
//! Non-blocking modes never report an error derived from the eventual reply.
//!
//! Once the session's registry is closed every mode fails with
//! `ClientError::Connection` before anything is sent.

use crate::domain::correlation::RequestIdGenerator;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::pending::{PendingCallRegistry, RegistryClosed, WaitError};
use crate::ipc::transport::Transport;
use inputemu_protocol::{ReplyRecord, RequestPayload, RequestRecord, NO_REPLY};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a call waits for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// Suspend the caller until the reply arrives; report its status.
    #[default]
    Blocking,
    /// Ask the server not to reply and return after sending.
    FireAndForget,
    /// Let the server reply, discard the reply on arrival.
    FireWithDiscardedReply,
}

impl CallMode {
    /// Map the `(modal, enable_reply)` flag pair used by the driver tooling.
    pub fn from_flags(modal: bool, enable_reply: bool) -> Self {
        match (modal, enable_reply) {
            (true, _) => CallMode::Blocking,
            (false, true) => CallMode::FireWithDiscardedReply,
            (false, false) => CallMode::FireAndForget,
        }
    }

    pub fn is_blocking(self) -> bool {
        self == CallMode::Blocking
    }
}

/// Issues requests for one session.
pub struct CallInvoker {
    transport: Arc<Transport>,
    registry: Arc<PendingCallRegistry>,
    ids: RequestIdGenerator,
    client_id: AtomicU32,
    call_timeout: Option<Duration>,
}

impl CallInvoker {
    pub fn new(
        transport: Arc<Transport>,
        registry: Arc<PendingCallRegistry>,
        ids: RequestIdGenerator,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            registry,
            ids,
            client_id: AtomicU32::new(0),
            call_timeout,
        }
    }

    /// Client identifier stamped on outgoing requests. Zero before the
    /// handshake completes.
    pub fn client_id(&self) -> u32 {
        self.client_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_client_id(&self, client_id: u32) {
        self.client_id.store(client_id, Ordering::Release);
    }

    pub fn registry(&self) -> &PendingCallRegistry {
        &self.registry
    }

    /// Blocking call with the configured timeout; non-Ok statuses are errors.
    pub fn call(&self, payload: RequestPayload) -> ClientResult<ReplyRecord> {
        self.call_with_timeout(payload, self.call_timeout)
    }

    /// Blocking call with an explicit timeout. `None` waits forever.
    pub fn call_with_timeout(
        &self,
        payload: RequestPayload,
        timeout: Option<Duration>,
    ) -> ClientResult<ReplyRecord> {
        let operation = payload.name();
        let reply = self.exchange(payload, timeout)?;
        match ClientError::from_status(reply.status, operation) {
            None => Ok(reply),
            Some(err) => {
                debug!(
                    request_id = reply.request_id,
                    operation,
                    status = %reply.status,
                    "Call rejected by server"
                );
                Err(err)
            }
        }
    }

    /// Send and wait for the reply without interpreting its status.
    pub(crate) fn exchange(
        &self,
        payload: RequestPayload,
        timeout: Option<Duration>,
    ) -> ClientResult<ReplyRecord> {
        let operation = payload.name();
        let request_id = self.ids.next_id();
        let handle = self
            .registry
            .register_awaited(request_id, operation)
            .map_err(|e| session_closed(operation, e))?;

        let request = RequestRecord::new(request_id, self.client_id(), payload);
        if let Err(e) = self.transport.send(&request) {
            self.registry.forget(request_id);
            warn!(request_id, operation, error = %e, "Failed to send request");
            return Err(e.into());
        }

        match handle.wait(timeout) {
            Ok(reply) => {
                self.registry.forget(request_id);
                Ok(reply)
            }
            Err(WaitError::TimedOut) => {
                self.registry.expire(request_id);
                Err(ClientError::Timeout {
                    context: operation.to_string(),
                    timeout: timeout.unwrap_or_default(),
                })
            }
            Err(WaitError::Abandoned) => Err(ClientError::Connection(format!(
                "{operation}: session closed while waiting for reply"
            ))),
        }
    }

    /// Send with request id 0; the server does not reply.
    pub fn fire_and_forget(&self, payload: RequestPayload) -> ClientResult<()> {
        if self.registry.is_closed() {
            return Err(session_closed(payload.name(), RegistryClosed));
        }
        let request = RequestRecord::new(NO_REPLY, self.client_id(), payload);
        self.transport.send(&request)?;
        Ok(())
    }

    /// Send with a fresh request id whose reply the dispatcher discards.
    pub fn fire_with_discarded_reply(&self, payload: RequestPayload) -> ClientResult<()> {
        let operation = payload.name();
        let request_id = self.ids.next_id();
        self.registry
            .register_fire_logged(request_id, operation)
            .map_err(|e| session_closed(operation, e))?;

        let request = RequestRecord::new(request_id, self.client_id(), payload);
        if let Err(e) = self.transport.send(&request) {
            self.registry.forget(request_id);
            warn!(request_id, operation, error = %e, "Failed to send request");
            return Err(e.into());
        }
        Ok(())
    }

    /// Dispatch on `mode`. Only blocking calls return a reply.
    pub fn invoke(
        &self,
        payload: RequestPayload,
        mode: CallMode,
    ) -> ClientResult<Option<ReplyRecord>> {
        match mode {
            CallMode::Blocking => self.call(payload).map(Some),
            CallMode::FireAndForget => self.fire_and_forget(payload).map(|()| None),
            CallMode::FireWithDiscardedReply => {
                self.fire_with_discarded_reply(payload).map(|()| None)
            }
        }
    }
}

fn session_closed(operation: &str, err: RegistryClosed) -> ClientError {
    ClientError::Connection(format!("{operation}: {err}"))
}
