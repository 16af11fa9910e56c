//! The two queues that connect a driver to one worker.

use tracing::debug;

use super::options::IpcOptions;
use super::queue::JsonIpcQueue;
use crate::error::IpcError;

/// Queues for one worker, seen from either side.
///
/// The driver creates both queues and removes them when its pair is
/// dropped; a worker attaches to both and leaves them alone.
#[derive(Debug)]
pub struct MessageQueuePair {
    pub to_worker: JsonIpcQueue,
    pub to_driver: JsonIpcQueue,
}

impl MessageQueuePair {
    /// Create both queues for the worker named in `options`.
    ///
    /// If the second queue cannot be created, the first one is removed again.
    pub fn create_for_driver(options: &IpcOptions) -> Result<Self, IpcError> {
        let capacity = options.capacity();
        let to_worker = JsonIpcQueue::create(&options.to_worker_name()?, capacity)?;
        let to_driver = JsonIpcQueue::create(&options.to_driver_name()?, capacity)?;
        debug!(
            driver_id = %options.driver_id,
            worker_id = options.worker_id,
            "Created worker queues"
        );
        Ok(Self {
            to_worker,
            to_driver,
        })
    }

    /// Attach to the queues a driver created for this worker.
    pub fn for_worker(options: &IpcOptions) -> Result<Self, IpcError> {
        let to_worker = JsonIpcQueue::open(&options.to_worker_name()?)?;
        let to_driver = JsonIpcQueue::open(&options.to_driver_name()?)?;
        debug!(
            driver_id = %options.driver_id,
            worker_id = options.worker_id,
            "Attached to worker queues"
        );
        Ok(Self {
            to_worker,
            to_driver,
        })
    }
}
