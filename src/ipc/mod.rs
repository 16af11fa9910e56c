//! Named JSON queues between a driver process and its workers.
//!
//! Every worker gets a pair of POSIX message queues whose names are derived
//! from the run's driver id and the worker's index. The driver creates both
//! queues before spawning the worker and removes them when it drops its
//! [`MessageQueuePair`]; the worker only attaches.
//!
//! # Architecture
//!
//! ```text
//!                      ┌─────────────────┐
//!                      │     Driver      │
//!                      │ (ResumableParser│
//!                      │   + dispatch)   │
//!                      └────────┬────────┘
//!                               │
//!            ┌──────────────────┼──────────────────┐
//!   /run-w0-to-worker   /run-w1-to-worker   /run-wN-to-worker
//!   /run-w0-to-driver   /run-w1-to-driver   /run-wN-to-driver
//!            │                  │                  │
//!      ┌─────▼─────┐      ┌─────▼─────┐      ┌─────▼─────┐
//!      │ Worker 0  │      │ Worker 1  │      │ Worker N  │
//!      │ (process) │      │ (process) │      │ (process) │
//!      └───────────┘      └───────────┘      └───────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use compdb_ipc::ipc::{IpcOptions, MessageQueuePair, WorkerToDriver};
//!
//! let options = IpcOptions::new(IpcOptions::new_driver_id(), 0);
//! let mut queues = MessageQueuePair::create_for_driver(&options)?;
//! // spawn `compdb-ipc worker --driver-id <id> --worker-id 0` here
//! let ready: WorkerToDriver = queues.to_driver.timed_receive(Duration::from_secs(5))?;
//! # Ok::<(), compdb_ipc::error::IpcError>(())
//! ```

pub mod options;
pub mod pair;
pub mod protocol;
pub mod queue;
pub mod worker;

pub use options::IpcOptions;
pub use pair::MessageQueuePair;
pub use protocol::{DriverToWorker, WorkerToDriver};
pub use queue::{JsonIpcQueue, Lifecycle, QueueCapacity};
pub use worker::{ExitReason, WorkerReport, run_worker};
