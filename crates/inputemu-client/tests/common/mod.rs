//! Simulated driver for integration tests.
//!
//! Serves the server queue of a [`MemoryQueueProvider`] on a background
//! thread and answers requests the way the driver does: version-checked
//! handshake, per-client reply queues, a small device table, and no reply for
//! request id 0. Knobs allow it to go silent or to answer pings out of order.

#![allow(dead_code)]

use inputemu_client::ipc::{MemoryQueueProvider, MessageQueue, QueueProvider};
use inputemu_client::protocol::{
    decode_request, encode_reply, DeviceClass, DeviceInfo, ReplyPayload, ReplyRecord,
    ReplyStatus, RequestPayload, RequestRecord, PROTOCOL_VERSION, RECORD_SIZE,
};
use inputemu_client::ClientConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const SERVER_QUEUE: &str = "test.server_queue";
pub const CLIENT_QUEUE_BASE: &str = "test.client_queue.";

/// Device ids at or above this are malformed.
pub const MAX_DEVICES: u32 = 64;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub protocol_version: u32,
    /// Ping replies are held back until this many are buffered, then sent
    /// newest first. 1 answers immediately.
    pub ping_reorder_window: usize,
    pub devices: Vec<DeviceInfo>,
    /// Refuse every handshake with this status.
    pub reject_handshake: Option<ReplyStatus>,
    /// Device ids whose info query is answered Ok with a generic payload.
    pub generic_info_devices: Vec<u32>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            ping_reorder_window: 1,
            devices: vec![
                DeviceInfo {
                    device_id: 0,
                    device_class: DeviceClass::Hmd,
                    device_mode: 0,
                    ref_device_id: 0,
                },
                DeviceInfo {
                    device_id: 3,
                    device_class: DeviceClass::Controller,
                    device_mode: 0,
                    ref_device_id: 0,
                },
            ],
            reject_handshake: None,
            generic_info_devices: Vec::new(),
        }
    }
}

struct ServerState {
    options: ServerOptions,
    stop: AtomicBool,
    silent: AtomicBool,
    next_client_id: AtomicU32,
    clients: Mutex<HashMap<u32, String>>,
    requests: Mutex<Vec<RequestRecord>>,
}

pub struct SimulatedServer {
    provider: MemoryQueueProvider,
    state: Arc<ServerState>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedServer {
    pub fn start() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        let provider = MemoryQueueProvider::new();
        let queue = provider
            .create(SERVER_QUEUE, 100, RECORD_SIZE)
            .expect("create server queue");
        let state = Arc::new(ServerState {
            options,
            stop: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            next_client_id: AtomicU32::new(1),
            clients: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        });

        let handle = {
            let provider = provider.clone();
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("simulated-driver".into())
                .spawn(move || serve(&provider, queue.as_ref(), &state))
                .expect("spawn simulated driver")
        };

        Self {
            provider,
            state,
            handle: Some(handle),
        }
    }

    pub fn provider(&self) -> Arc<dyn QueueProvider> {
        Arc::new(self.provider.clone())
    }

    pub fn memory_provider(&self) -> &MemoryQueueProvider {
        &self.provider
    }

    /// Client configuration pointing at this server with fast polling.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(SERVER_QUEUE, CLIENT_QUEUE_BASE);
        config.receive_timeout = Duration::from_millis(10);
        config.handshake_timeout = Duration::from_secs(2);
        config.disconnect_timeout = Duration::from_millis(200);
        config
    }

    /// Stop answering anything except the handshake.
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.requests.lock().clone()
    }

    /// Requests received for one operation.
    pub fn requests_named(&self, operation: &str) -> Vec<RequestRecord> {
        self.requests()
            .into_iter()
            .filter(|r| r.payload.name() == operation)
            .collect()
    }

    /// Wait until at least `count` requests of `operation` arrived.
    pub fn wait_for_requests(&self, operation: &str, count: usize) -> Vec<RequestRecord> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let found = self.requests_named(operation);
            if found.len() >= count {
                return found;
            }
            assert!(
                Instant::now() < deadline,
                "expected {count} {operation} requests, got {}",
                found.len()
            );
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Currently registered client ids.
    pub fn client_ids(&self) -> Vec<u32> {
        self.state.clients.lock().keys().copied().collect()
    }

    /// Push raw bytes onto a client's reply queue.
    pub fn inject(&self, client_queue: &str, bytes: &[u8]) {
        self.provider
            .open(client_queue)
            .expect("open client queue")
            .send(bytes)
            .expect("inject record");
    }

    /// Push a well-formed reply onto a client's reply queue.
    pub fn inject_reply(&self, client_queue: &str, reply: &ReplyRecord) {
        self.inject(client_queue, &encode_reply(reply).expect("encode reply"));
    }
}

impl Drop for SimulatedServer {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Poll `condition` for up to two seconds.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// =============================================================================
// SERVER LOOP
// =============================================================================

fn serve(provider: &MemoryQueueProvider, queue: &dyn MessageQueue, state: &ServerState) {
    let mut buf = vec![0u8; RECORD_SIZE];
    let mut held_pings: Vec<(String, ReplyRecord)> = Vec::new();

    while !state.stop.load(Ordering::SeqCst) {
        let received = match queue.timed_receive(&mut buf, Duration::from_millis(5)) {
            Ok(Some(len)) if len == RECORD_SIZE => decode_request(&buf).ok(),
            Ok(Some(_)) => None,
            Ok(None) => {
                // quiet period: release a partial batch
                flush(provider, &mut held_pings);
                None
            }
            Err(_) => break,
        };
        let Some(request) = received else {
            continue;
        };
        state.requests.lock().push(request.clone());

        let Some((queue_name, reply)) = handle(state, &request) else {
            continue;
        };

        if matches!(reply.payload, ReplyPayload::Ping { .. })
            && state.options.ping_reorder_window > 1
        {
            held_pings.push((queue_name, reply));
            if held_pings.len() >= state.options.ping_reorder_window {
                flush(provider, &mut held_pings);
            }
        } else {
            send(provider, &queue_name, &reply);
        }
    }
}

fn flush(provider: &MemoryQueueProvider, held: &mut Vec<(String, ReplyRecord)>) {
    while let Some((queue_name, reply)) = held.pop() {
        send(provider, &queue_name, &reply);
    }
}

fn send(provider: &MemoryQueueProvider, queue_name: &str, reply: &ReplyRecord) {
    if let Ok(queue) = provider.open(queue_name) {
        if let Ok(bytes) = encode_reply(reply) {
            let _ = queue.send(&bytes);
        }
    }
}

/// Decide the reply to a request and the queue it goes to.
fn handle(state: &ServerState, request: &RequestRecord) -> Option<(String, ReplyRecord)> {
    if let RequestPayload::ClientConnect {
        protocol_version,
        queue_name,
    } = &request.payload
    {
        let queue_name = queue_name.as_string();
        let server_version = state.options.protocol_version;
        if let Some(status) = state.options.reject_handshake {
            return Some((
                queue_name,
                ReplyRecord::new(request.request_id, status, ReplyPayload::None),
            ));
        }
        if *protocol_version != server_version {
            let reply = ReplyRecord::new(
                request.request_id,
                ReplyStatus::InvalidVersion,
                ReplyPayload::ClientConnect {
                    client_id: 0,
                    protocol_version: server_version,
                },
            );
            return Some((queue_name, reply));
        }
        let client_id = state.next_client_id.fetch_add(1, Ordering::SeqCst);
        state.clients.lock().insert(client_id, queue_name.clone());
        let reply = ReplyRecord::new(
            request.request_id,
            ReplyStatus::Ok,
            ReplyPayload::ClientConnect {
                client_id,
                protocol_version: server_version,
            },
        );
        return Some((queue_name, reply));
    }

    let queue_name = {
        let mut clients = state.clients.lock();
        let name = clients.get(&request.client_id).cloned();
        if matches!(request.payload, RequestPayload::ClientDisconnect) {
            clients.remove(&request.client_id);
        }
        name
    }?;

    if !request.expects_reply() || state.silent.load(Ordering::SeqCst) {
        return None;
    }

    let (status, payload) = match &request.payload {
        RequestPayload::Ping { nonce } => (ReplyStatus::Ok, ReplyPayload::Ping { nonce: *nonce }),
        RequestPayload::GetDeviceInfo { device_id }
            if state.options.generic_info_devices.contains(device_id) =>
        {
            (ReplyStatus::Ok, ReplyPayload::Generic)
        }
        RequestPayload::GetDeviceInfo { device_id } => match lookup(state, *device_id) {
            Ok(info) => (ReplyStatus::Ok, ReplyPayload::DeviceInfo(info)),
            Err(status) => (status, ReplyPayload::None),
        },
        RequestPayload::SetDeviceNormalMode { device_id }
        | RequestPayload::SetMotionCompensationMode { device_id, .. } => {
            match lookup(state, *device_id) {
                Ok(_) => (ReplyStatus::Ok, ReplyPayload::Generic),
                Err(status) => (status, ReplyPayload::Generic),
            }
        }
        RequestPayload::SetMotionCompensationProperties(props) if props.is_empty() => {
            (ReplyStatus::MissingProperty, ReplyPayload::Generic)
        }
        _ => (ReplyStatus::Ok, ReplyPayload::Generic),
    };
    Some((queue_name, ReplyRecord::new(request.request_id, status, payload)))
}

fn lookup(state: &ServerState, device_id: u32) -> Result<DeviceInfo, ReplyStatus> {
    if device_id >= MAX_DEVICES {
        return Err(ReplyStatus::InvalidId);
    }
    state
        .options
        .devices
        .iter()
        .find(|d| d.device_id == device_id)
        .copied()
        .ok_or(ReplyStatus::NotFound)
}
