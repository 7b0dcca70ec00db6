//! Transport: the session's pair of queues.
//!
//! The outbound queue is the driver's well-known request queue; the inbound
//! queue is created fresh per session under a randomized name. A `Transport`
//! only exists with both handles open.

use crate::domain::correlation::queue_suffix;
use crate::domain::error::{ClientError, ClientResult};
use crate::ipc::error::TransportError;
use crate::ipc::queue::{MessageQueue, QueueProvider};
use inputemu_protocol::{decode_reply, encode_request, ReplyRecord, RequestRecord, RECORD_SIZE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Outcome of one bounded receive.
#[derive(Debug)]
pub enum Received {
    Reply(ReplyRecord),
    TimedOut,
    /// A record of the wrong size arrived and was dropped.
    Dropped { size: usize },
}

pub struct Transport {
    provider: Arc<dyn QueueProvider>,
    server: Arc<dyn MessageQueue>,
    client: Arc<dyn MessageQueue>,
    client_queue_name: String,
    receive_buf: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl Transport {
    /// Open the server queue and create this session's reply queue.
    ///
    /// If the reply queue cannot be created the server handle is released
    /// before returning.
    pub fn open(
        provider: Arc<dyn QueueProvider>,
        server_queue_name: &str,
        client_queue_base: &str,
        capacity: usize,
    ) -> ClientResult<Self> {
        let server = provider.open(server_queue_name).map_err(|e| {
            ClientError::Connection(format!("could not open server-side message queue: {e}"))
        })?;

        let client_queue_name = format!("{client_queue_base}{}", queue_suffix());
        let client = match provider.create(&client_queue_name, capacity, RECORD_SIZE) {
            Ok(queue) => queue,
            Err(e) => {
                drop(server);
                return Err(ClientError::Connection(format!(
                    "could not open client-side message queue: {e}"
                )));
            }
        };

        info!(
            server_queue = server_queue_name,
            client_queue = %client_queue_name,
            capacity,
            "Opened message queues"
        );

        Ok(Self {
            provider,
            server,
            client,
            client_queue_name,
            receive_buf: Mutex::new(vec![0u8; RECORD_SIZE]),
            closed: AtomicBool::new(false),
        })
    }

    /// Name of this session's reply queue.
    pub fn client_queue_name(&self) -> &str {
        &self.client_queue_name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encode and enqueue a request on the server queue.
    pub fn send(&self, request: &RequestRecord) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::QueueClosed(self.server.name().to_string()));
        }
        let bytes = encode_request(request)?;
        self.server.send(&bytes)?;
        trace!(
            request_id = request.request_id,
            operation = request.payload.name(),
            "Sent request"
        );
        Ok(())
    }

    /// Wait up to `timeout` for one reply record.
    ///
    /// Records whose size is not exactly one record are dropped, not reported
    /// as errors. Full-size records that fail to decode are errors.
    pub fn receive(&self, timeout: Duration) -> Result<Received, TransportError> {
        let mut buf = self.receive_buf.lock();
        match self.client.timed_receive(&mut buf, timeout)? {
            None => Ok(Received::TimedOut),
            Some(size) if size != RECORD_SIZE => {
                debug!(
                    size,
                    expected = RECORD_SIZE,
                    "Dropping record of unexpected size"
                );
                Ok(Received::Dropped { size })
            }
            Some(_) => Ok(Received::Reply(decode_reply(&buf)?)),
        }
    }

    /// Remove the reply queue. Idempotent.
    ///
    /// Must only be called once the dispatcher has stopped reading.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.provider.remove(&self.client_queue_name) {
            warn!(
                client_queue = %self.client_queue_name,
                error = %e,
                "Failed to remove client-side message queue"
            );
        } else {
            debug!(client_queue = %self.client_queue_name, "Removed client-side message queue");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
