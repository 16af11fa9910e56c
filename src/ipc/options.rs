//! Shared configuration for a driver and its workers.
//!
//! Both sides derive queue names from the same [`IpcOptions`], so the only
//! things that must travel from driver to worker are the driver id and the
//! worker id (on the command line or through the environment).
//!
//! # Environment Variables
//!
//! - `COMPDB_IPC_DRIVER_ID` - Driver run identifier
//! - `COMPDB_IPC_WORKER_ID` - Worker index
//! - `COMPDB_IPC_RECEIVE_TIMEOUT_SECS` - Receive timeout in seconds
//! - `COMPDB_IPC_MAX_MESSAGE_SIZE` - Per-message size limit in bytes

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::queue::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_MESSAGES, QueueCapacity, normalize_name};
use crate::error::IpcError;

/// Default time a receive waits before reporting a timeout.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of back-to-back timeouts after which a worker gives up.
pub const DEFAULT_MAX_IDLE_TIMEOUTS: u32 = 3;

/// Direction tag of the queue the driver writes and the worker reads.
const TO_WORKER_TAG: &str = "to-worker";
/// Direction tag of the queue the worker writes and the driver reads.
const TO_DRIVER_TAG: &str = "to-driver";

/// Configuration shared by a driver and one of its workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcOptions {
    /// Identifies one indexing run; keeps concurrent runs apart.
    pub driver_id: String,
    /// Index of the worker within the run.
    pub worker_id: u32,
    /// Queue capacity in messages.
    pub max_messages: usize,
    /// Largest encoded message in bytes.
    pub max_message_size: usize,
    /// How long a single receive waits.
    #[serde(with = "duration_secs")]
    pub receive_timeout: Duration,
    /// Consecutive receive timeouts before an idle worker exits.
    pub max_idle_timeouts: u32,
}

impl Default for IpcOptions {
    fn default() -> Self {
        Self {
            driver_id: "compdb-ipc".to_string(),
            worker_id: 0,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            max_idle_timeouts: DEFAULT_MAX_IDLE_TIMEOUTS,
        }
    }
}

impl IpcOptions {
    pub fn new(driver_id: impl Into<String>, worker_id: u32) -> Self {
        Self {
            driver_id: driver_id.into(),
            worker_id,
            ..Self::default()
        }
    }

    /// A driver id that will not collide with any other run.
    pub fn new_driver_id() -> String {
        format!("compdb-{}", uuid::Uuid::new_v4().simple())
    }

    pub fn with_driver_id(mut self, driver_id: impl Into<String>) -> Self {
        self.driver_id = driver_id.into();
        self
    }

    pub fn with_worker_id(mut self, worker_id: u32) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_max_idle_timeouts(mut self, count: u32) -> Self {
        self.max_idle_timeouts = count;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Unparsable values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("COMPDB_IPC_DRIVER_ID")
            && !id.is_empty()
        {
            self.driver_id = id;
        }

        if let Some(id) = env_number("COMPDB_IPC_WORKER_ID") {
            self.worker_id = id;
        }

        if let Some(secs) = env_number::<u64>("COMPDB_IPC_RECEIVE_TIMEOUT_SECS") {
            self.receive_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = env_number("COMPDB_IPC_MAX_MESSAGE_SIZE") {
            self.max_message_size = size;
        }

        self
    }

    /// Capacity used when the driver creates the queues.
    pub fn capacity(&self) -> QueueCapacity {
        QueueCapacity {
            max_messages: self.max_messages,
            max_message_size: self.max_message_size,
        }
    }

    /// Name of the queue carrying tasks to this worker.
    pub fn to_worker_name(&self) -> Result<String, IpcError> {
        self.queue_name(TO_WORKER_TAG)
    }

    /// Name of the queue carrying results back to the driver.
    pub fn to_driver_name(&self) -> Result<String, IpcError> {
        self.queue_name(TO_DRIVER_TAG)
    }

    fn queue_name(&self, direction: &str) -> Result<String, IpcError> {
        if self.driver_id.is_empty() || self.driver_id.contains('/') {
            return Err(IpcError::InvalidName(self.driver_id.clone()));
        }
        normalize_name(&format!(
            "{}-w{}-{}",
            self.driver_id, self.worker_id, direction
        ))
    }
}

fn env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
