//! Named JSON message queues shared between processes.
//!
//! Backed by POSIX message queues (`mq_open(3)`), so a queue outlives the
//! process that created it until it is explicitly unlinked. Exactly one
//! process creates each queue ([`Lifecycle::CreateOnly`]) and is the only one
//! that removes it; every other process attaches with
//! [`Lifecycle::OpenOnly`] and merely closes its own descriptor.

use std::time::Duration;

use nix::errno::Errno;
use nix::mqueue::{MQ_OFlag, MqAttr, MqdT, mq_close, mq_getattr, mq_open, mq_send, mq_timedreceive, mq_unlink};
use nix::sys::stat::Mode;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, clock_gettime};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::error::IpcError;

/// Default number of messages a queue can hold.
///
/// Matches the Linux default `fs.mqueue.msg_max`.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Default maximum message size in bytes.
///
/// Matches the Linux default `fs.mqueue.msgsize_max`.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Root segment of schema error paths.
const MESSAGE_ROOT: &str = "ipc-message";

/// Which side is responsible for the queue's existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// This handle created the queue and unlinks it on drop.
    CreateOnly,
    /// This handle attached to an existing queue and leaves it in place.
    OpenOnly,
}

/// Capacity of a newly created queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCapacity {
    pub max_messages: usize,
    pub max_message_size: usize,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Turn a queue name into the `/name` form POSIX requires.
pub fn normalize_name(name: &str) -> Result<String, IpcError> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    // NAME_MAX minus the leading slash.
    if bare.is_empty() || bare.len() > 254 || bare.contains(['/', '\0']) {
        return Err(IpcError::InvalidName(name.to_string()));
    }
    Ok(format!("/{}", bare))
}

/// A bounded FIFO of JSON values, attachable by name from any process.
///
/// The handle can be moved but not cloned: the creating handle owns the
/// queue's removal, and a copy would make that ownership ambiguous.
#[derive(Debug)]
pub struct JsonIpcQueue {
    mqd: Option<MqdT>,
    name: String,
    lifecycle: Lifecycle,
    max_message_size: usize,
    buffer: Vec<u8>,
}

impl JsonIpcQueue {
    /// Create a new queue. Fails if a queue with this name already exists.
    pub fn create(name: &str, capacity: QueueCapacity) -> Result<Self, IpcError> {
        let name = normalize_name(name)?;
        let attr = MqAttr::new(
            0,
            capacity.max_messages as _,
            capacity.max_message_size as _,
            0,
        );
        let oflag = MQ_OFlag::O_CREAT | MQ_OFlag::O_EXCL | MQ_OFlag::O_RDWR;
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;

        let mqd = mq_open(name.as_str(), oflag, mode, Some(&attr)).map_err(|source| {
            IpcError::Create {
                name: name.clone(),
                source,
            }
        })?;
        debug!(
            queue = %name,
            max_messages = capacity.max_messages,
            max_message_size = capacity.max_message_size,
            "Created message queue"
        );
        // Any failure from here on drops the handle, which unlinks the name.
        Self::attach(mqd, name, Lifecycle::CreateOnly)
    }

    /// Attach to an existing queue. Fails if no queue with this name exists.
    pub fn open(name: &str) -> Result<Self, IpcError> {
        let name = normalize_name(name)?;
        let mqd = mq_open(name.as_str(), MQ_OFlag::O_RDWR, Mode::empty(), None).map_err(
            |source| IpcError::Open {
                name: name.clone(),
                source,
            },
        )?;
        debug!(queue = %name, "Opened message queue");
        Self::attach(mqd, name, Lifecycle::OpenOnly)
    }

    fn attach(mqd: MqdT, name: String, lifecycle: Lifecycle) -> Result<Self, IpcError> {
        let mut queue = Self {
            mqd: Some(mqd),
            name,
            lifecycle,
            max_message_size: 0,
            buffer: Vec::new(),
        };
        let attr = mq_getattr(queue.mqd()?).map_err(IpcError::Transport)?;
        queue.max_message_size = attr.msgsize() as usize;
        queue.buffer = vec![0; queue.max_message_size];
        Ok(queue)
    }

    /// Remove a queue name left behind by a crashed run.
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn unlink(name: &str) -> Result<bool, IpcError> {
        let name = normalize_name(name)?;
        match mq_unlink(name.as_str()) {
            Ok(()) => Ok(true),
            Err(Errno::ENOENT) => Ok(false),
            Err(e) => Err(IpcError::Transport(e)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Largest encoded message the queue accepts.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Number of messages currently waiting in the queue.
    pub fn pending(&self) -> Result<usize, IpcError> {
        let attr = mq_getattr(self.mqd()?).map_err(IpcError::Transport)?;
        Ok(attr.curmsgs() as usize)
    }

    /// Serialize `value` as JSON and enqueue it.
    ///
    /// Blocks while the queue is full; no timeout is applied here.
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), IpcError> {
        let bytes = serde_json::to_vec(value).map_err(IpcError::Encode)?;
        if bytes.len() > self.max_message_size {
            return Err(IpcError::MessageTooLarge {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }
        let mqd = self.mqd()?;
        loop {
            match mq_send(mqd, &bytes, 0) {
                Ok(()) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(IpcError::Transport(e)),
            }
        }
        trace!(queue = %self.name, size = bytes.len(), "Sent message");
        Ok(())
    }

    /// Wait up to `wait` for the next message and decode it as `T`.
    ///
    /// Exactly one of three things happens:
    /// - a message arrives and decodes: it is consumed and returned;
    /// - nothing arrives in time: [`IpcError::Timeout`], queue untouched;
    /// - a message arrives but does not decode: it is consumed and
    ///   [`IpcError::Schema`] (or [`IpcError::Decode`] for non-JSON) is
    ///   returned.
    pub fn timed_receive<T: DeserializeOwned>(&mut self, wait: Duration) -> Result<T, IpcError> {
        let deadline = deadline_after(wait)?;

        let mqd = self.mqd.as_ref().ok_or(IpcError::Transport(Errno::EBADF))?;
        let mut priority = 0u32;
        let len = loop {
            match mq_timedreceive(mqd, &mut self.buffer, &mut priority, &deadline) {
                Ok(len) => break len,
                // Same absolute deadline, so retrying does not extend the wait.
                Err(Errno::EINTR) => continue,
                Err(Errno::ETIMEDOUT) => {
                    trace!(queue = %self.name, ?wait, "Receive timed out");
                    return Err(IpcError::Timeout(wait));
                }
                Err(e) => return Err(IpcError::Transport(e)),
            }
        };
        trace!(queue = %self.name, size = len, "Received message");
        decode(&self.buffer[..len])
    }

    /// Receive without waiting. `Ok(None)` means the queue was empty.
    pub fn try_receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>, IpcError> {
        match self.timed_receive(Duration::ZERO) {
            Ok(value) => Ok(Some(value)),
            Err(IpcError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn mqd(&self) -> Result<&MqdT, IpcError> {
        self.mqd.as_ref().ok_or(IpcError::Transport(Errno::EBADF))
    }
}

/// Latest absolute deadline accepted by the kernel, whose timers count
/// nanoseconds in an `i64` (early 2262).
const LATEST_DEADLINE: Duration = Duration::from_secs(i64::MAX as u64 / 1_000_000_000 - 1);

/// Absolute `CLOCK_REALTIME` deadline `wait` from now.
///
/// Longer waits saturate at [`LATEST_DEADLINE`] instead of overflowing.
fn deadline_after(wait: Duration) -> Result<TimeSpec, IpcError> {
    let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(IpcError::Transport)?;
    let now = Duration::new(now.tv_sec().max(0) as u64, now.tv_nsec() as u32);
    let deadline = now
        .checked_add(wait)
        .map_or(LATEST_DEADLINE, |deadline| deadline.min(LATEST_DEADLINE));
    Ok(TimeSpec::from_duration(deadline))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IpcError> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = match err.path().to_string() {
            p if p == "." => MESSAGE_ROOT.to_string(),
            p => format!("{}.{}", MESSAGE_ROOT, p),
        };
        let inner = err.into_inner();
        if inner.is_data() {
            IpcError::Schema {
                path,
                message: inner.to_string(),
            }
        } else {
            IpcError::Decode(inner)
        }
    })?;
    de.end().map_err(IpcError::Decode)?;
    Ok(value)
}

impl Drop for JsonIpcQueue {
    fn drop(&mut self) {
        let Some(mqd) = self.mqd.take() else {
            return;
        };
        if let Err(e) = mq_close(mqd) {
            warn!(queue = %self.name, error = %e, "Failed to close message queue");
        }
        if self.lifecycle == Lifecycle::CreateOnly {
            match mq_unlink(self.name.as_str()) {
                Ok(()) => debug!(queue = %self.name, "Removed message queue"),
                Err(e) => warn!(queue = %self.name, error = %e, "Failed to remove message queue"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn unique_name(tag: &str) -> String {
        format!("compdb-ipc-test-{}-{}", tag, uuid::Uuid::new_v4().simple())
    }

    fn small_capacity() -> QueueCapacity {
        QueueCapacity {
            max_messages: 4,
            max_message_size: 1024,
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Task {
        task: String,
        file: String,
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("w0-to-worker").unwrap(), "/w0-to-worker");
        assert_eq!(normalize_name("/w0-to-worker").unwrap(), "/w0-to-worker");
        assert!(normalize_name("").is_err());
        assert!(normalize_name("/").is_err());
        assert!(normalize_name("a/b").is_err());
        assert!(normalize_name(&"x".repeat(300)).is_err());
    }

    #[test]
    fn test_round_trip_between_creator_and_opener() {
        let name = unique_name("roundtrip");
        let creator = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        let mut opener = JsonIpcQueue::open(&name).unwrap();
        assert_eq!(creator.lifecycle(), Lifecycle::CreateOnly);
        assert_eq!(opener.lifecycle(), Lifecycle::OpenOnly);
        assert_eq!(opener.max_message_size(), 1024);

        let value = json!({"task": "index", "file": "/a/x.cpp", "n": [1, 2, 3]});
        creator.send(&value).unwrap();
        let got: serde_json::Value = opener.timed_receive(Duration::from_secs(5)).unwrap();
        assert_eq!(got, value);
    }

    #[test]
    fn test_fifo_order() {
        let name = unique_name("fifo");
        let mut queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        for i in 0..3 {
            queue.send(&i).unwrap();
        }
        assert_eq!(queue.pending().unwrap(), 3);
        for i in 0..3 {
            let got: u32 = queue.timed_receive(Duration::from_secs(1)).unwrap();
            assert_eq!(got, i);
        }
    }

    #[test]
    fn test_timeout_leaves_queue_usable() {
        let name = unique_name("timeout");
        let mut queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();

        let err = queue
            .timed_receive::<Task>(Duration::from_millis(50))
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

        let task = Task {
            task: "index".into(),
            file: "/a/x.cpp".into(),
        };
        queue.send(&task).unwrap();
        let got: Task = queue.timed_receive(Duration::from_secs(1)).unwrap();
        assert_eq!(got, task);
    }

    #[test]
    fn test_deadline_saturates_for_long_waits() {
        let latest = LATEST_DEADLINE.as_secs() as i64;
        assert_eq!(deadline_after(Duration::MAX).unwrap().tv_sec(), latest);

        let three_centuries = Duration::from_secs(300 * 365 * 86_400);
        assert_eq!(deadline_after(three_centuries).unwrap().tv_sec(), latest);

        let now = deadline_after(Duration::ZERO).unwrap();
        let soon = deadline_after(Duration::from_secs(60)).unwrap();
        assert!(soon.tv_sec() >= now.tv_sec() + 60);
        assert!(soon.tv_sec() < latest);
    }

    #[test]
    fn test_unbounded_wait_blocks_until_message_arrives() {
        let name = unique_name("forever");
        let mut queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();

        let sender = {
            let name = name.clone();
            std::thread::spawn(move || {
                let opener = JsonIpcQueue::open(&name).unwrap();
                std::thread::sleep(Duration::from_millis(100));
                opener.send(&7u32).unwrap();
            })
        };
        let got: u32 = queue.timed_receive(Duration::MAX).unwrap();
        assert_eq!(got, 7);
        sender.join().unwrap();

        queue.send(&8u32).unwrap();
        let got: u32 = queue
            .timed_receive(Duration::from_secs(300 * 365 * 86_400))
            .unwrap();
        assert_eq!(got, 8);
    }

    #[test]
    fn test_schema_error_consumes_message_and_reports_path() {
        let name = unique_name("schema");
        let mut queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        queue.send(&json!({"task": "index", "file": 42})).unwrap();
        queue.send(&json!({"task": "index", "file": "/ok.cc"})).unwrap();

        match queue.timed_receive::<Task>(Duration::from_secs(1)) {
            Err(IpcError::Schema { path, .. }) => {
                assert!(path.starts_with("ipc-message"), "{}", path);
                assert!(path.ends_with("file"), "{}", path);
            }
            other => panic!("Expected schema error, got {:?}", other),
        }

        // The bad message was consumed; the next one decodes.
        let got: Task = queue.timed_receive(Duration::from_secs(1)).unwrap();
        assert_eq!(got.file, "/ok.cc");
    }

    #[test]
    fn test_try_receive() {
        let name = unique_name("try");
        let mut queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        assert_eq!(queue.try_receive::<u8>().unwrap(), None);
        queue.send(&7u8).unwrap();
        assert_eq!(queue.try_receive::<u8>().unwrap(), Some(7));
    }

    #[test]
    fn test_message_too_large() {
        let name = unique_name("large");
        let queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        let big = "x".repeat(2048);
        match queue.send(&big) {
            Err(IpcError::MessageTooLarge { size, max }) => {
                assert!(size > 2048);
                assert_eq!(max, 1024);
            }
            other => panic!("Expected MessageTooLarge, got {:?}", other),
        }
        assert_eq!(queue.pending().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_create_and_missing_open() {
        let name = unique_name("dup");
        let _first = JsonIpcQueue::create(&name, small_capacity()).unwrap();

        let err = JsonIpcQueue::create(&name, small_capacity()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);

        let missing = unique_name("missing");
        let err = JsonIpcQueue::open(&missing).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_lifecycle_teardown() {
        let name = unique_name("lifecycle");
        let creator = JsonIpcQueue::create(&name, small_capacity()).unwrap();

        // Dropping an attached handle leaves the queue in place.
        let opener = JsonIpcQueue::open(&name).unwrap();
        creator.send(&"still here").unwrap();
        drop(opener);
        let mut again = JsonIpcQueue::open(&name).unwrap();
        let got: String = again.timed_receive(Duration::from_secs(1)).unwrap();
        assert_eq!(got, "still here");

        // Dropping the creator removes the name.
        drop(creator);
        assert!(JsonIpcQueue::open(&name).is_err());

        // A handle opened before removal keeps working until it is dropped.
        again.send(&1).unwrap();
        let got: i32 = again.timed_receive(Duration::from_secs(1)).unwrap();
        assert_eq!(got, 1);
    }

    #[test]
    fn test_moved_queue_tears_down_once() {
        fn factory(name: &str) -> JsonIpcQueue {
            JsonIpcQueue::create(name, small_capacity()).unwrap()
        }
        let name = unique_name("moved");
        let queues = vec![factory(&name)];
        assert!(JsonIpcQueue::open(&name).is_ok());
        drop(queues);
        assert!(JsonIpcQueue::open(&name).is_err());
    }

    #[test]
    fn test_unlink_stale_queue() {
        let name = unique_name("stale");
        assert!(!JsonIpcQueue::unlink(&name).unwrap());

        let queue = JsonIpcQueue::create(&name, small_capacity()).unwrap();
        std::mem::forget(queue);
        assert!(JsonIpcQueue::unlink(&name).unwrap());
        assert!(JsonIpcQueue::open(&name).is_err());
    }
}
