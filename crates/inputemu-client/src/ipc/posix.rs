//! POSIX message queue backend.
//!
//! Kernel-managed named queues: capacity and record size are enforced by the
//! kernel, and queues are visible to every process of the machine. Names are
//! normalized to the `/name` form POSIX requires.
//!
//! Unprivileged processes are limited by `/proc/sys/fs/mqueue/msg_max`
//! (10 by default) and `msgsize_max`; larger capacities need a raised limit.

use crate::ipc::error::TransportError;
use crate::ipc::queue::{MessageQueue, QueueProvider};
use nix::errno::Errno;
use nix::mqueue::{mq_close, mq_open, mq_send, mq_timedreceive, mq_unlink, MqAttr, MqdT, MQ_OFlag};
use nix::sys::stat::Mode;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Permissions of created queues; the driver may run as another user.
const QUEUE_MODE: u32 = 0o666;

const MSG_MAX_PATH: &str = "/proc/sys/fs/mqueue/msg_max";
const MSGSIZE_MAX_PATH: &str = "/proc/sys/fs/mqueue/msgsize_max";

/// Reason for a failed create. EINVAL there almost always means the
/// requested attributes exceed the kernel limits.
fn create_failure(name: &str, errno: Errno, capacity: usize, record_size: usize) -> TransportError {
    let reason = match errno {
        Errno::EINVAL => format!(
            "{} (capacity {capacity} or record size {record_size} exceeds the kernel limit; \
             check {MSG_MAX_PATH} and {MSGSIZE_MAX_PATH})",
            errno.desc()
        ),
        other => other.desc().to_string(),
    };
    TransportError::CreateFailed {
        queue: name.to_string(),
        reason,
    }
}

fn normalize(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

fn c_name(name: &str) -> Result<CString, TransportError> {
    CString::new(normalize(name)).map_err(|_| TransportError::OpenFailed {
        queue: name.to_string(),
        reason: "name contains a NUL byte".into(),
    })
}

/// One open POSIX queue descriptor.
pub struct PosixQueue {
    name: String,
    record_size: usize,
    mqd: Option<MqdT>,
}

impl PosixQueue {
    fn mqd(&self) -> Result<&MqdT, TransportError> {
        self.mqd
            .as_ref()
            .ok_or_else(|| TransportError::QueueClosed(self.name.clone()))
    }

    fn io_error(&self, errno: Errno) -> TransportError {
        TransportError::Io {
            queue: self.name.clone(),
            reason: errno.desc().to_string(),
        }
    }
}

impl MessageQueue for PosixQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn send(&self, record: &[u8]) -> Result<(), TransportError> {
        if record.len() > self.record_size {
            return Err(TransportError::RecordTooLarge {
                size: record.len(),
                max: self.record_size,
            });
        }
        match mq_send(self.mqd()?, record, 0) {
            Ok(()) => Ok(()),
            Err(Errno::EAGAIN) => Err(TransportError::QueueFull(self.name.clone())),
            Err(Errno::EBADF) => Err(TransportError::QueueClosed(self.name.clone())),
            Err(errno) => Err(self.io_error(errno)),
        }
    }

    fn timed_receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<usize>, TransportError> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(|e| self.io_error(e))?;
        let deadline = now + TimeSpec::from(timeout);
        let mut priority = 0u32;
        match mq_timedreceive(self.mqd()?, buf, &mut priority, &deadline) {
            Ok(len) => Ok(Some(len)),
            Err(Errno::ETIMEDOUT) | Err(Errno::EINTR) => Ok(None),
            Err(Errno::EBADF) => Err(TransportError::QueueClosed(self.name.clone())),
            Err(errno) => Err(self.io_error(errno)),
        }
    }
}

impl Drop for PosixQueue {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            if let Err(errno) = mq_close(mqd) {
                warn!(queue = %self.name, error = %errno, "Failed to close message queue");
            }
        }
    }
}

/// Provider backed by the kernel's POSIX message queues.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixQueueProvider;

impl PosixQueueProvider {
    pub fn new() -> Self {
        Self
    }
}

impl QueueProvider for PosixQueueProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn MessageQueue>, TransportError> {
        let path = c_name(name)?;
        let flags = MQ_OFlag::O_WRONLY | MQ_OFlag::O_NONBLOCK | MQ_OFlag::O_CLOEXEC;
        let mqd = mq_open(path.as_c_str(), flags, Mode::empty(), None).map_err(|errno| {
            if errno == Errno::ENOENT {
                TransportError::QueueNotFound(name.to_string())
            } else {
                TransportError::OpenFailed {
                    queue: name.to_string(),
                    reason: errno.desc().to_string(),
                }
            }
        })?;
        // the record size of an opened queue is whatever its creator chose;
        // the kernel rejects oversized sends itself
        Ok(Arc::new(PosixQueue {
            name: name.to_string(),
            record_size: usize::MAX,
            mqd: Some(mqd),
        }))
    }

    fn create(
        &self,
        name: &str,
        capacity: usize,
        record_size: usize,
    ) -> Result<Arc<dyn MessageQueue>, TransportError> {
        self.remove(name)?;
        let path = c_name(name)?;
        let flags = MQ_OFlag::O_RDWR | MQ_OFlag::O_CREAT | MQ_OFlag::O_EXCL | MQ_OFlag::O_CLOEXEC;
        let attr = MqAttr::new(0, capacity as _, record_size as _, 0);
        let mqd = mq_open(
            path.as_c_str(),
            flags,
            Mode::from_bits_truncate(QUEUE_MODE as _),
            Some(&attr),
        )
        .map_err(|errno| create_failure(name, errno, capacity, record_size))?;
        debug!(queue = name, capacity, record_size, "Created message queue");
        Ok(Arc::new(PosixQueue {
            name: name.to_string(),
            record_size,
            mqd: Some(mqd),
        }))
    }

    fn remove(&self, name: &str) -> Result<(), TransportError> {
        let path = c_name(name)?;
        match mq_unlink(path.as_c_str()) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(errno) => Err(TransportError::Io {
                queue: name.to_string(),
                reason: errno.desc().to_string(),
            }),
        }
    }
}
