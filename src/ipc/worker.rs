//! Reference worker loop.
//!
//! Runs when `compdb-ipc worker` is invoked. The worker attaches to the
//! queues its driver created, announces itself and then answers tasks until
//! told to stop or until the driver goes quiet.

use tracing::{debug, info, warn};

use super::options::IpcOptions;
use super::pair::MessageQueuePair;
use super::protocol::{DriverToWorker, WorkerToDriver};
use crate::compdb::CompileCommand;
use crate::error::IpcError;

/// Why the worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The driver sent [`DriverToWorker::Shutdown`].
    Shutdown,
    /// Too many receives in a row timed out.
    Idle,
}

/// Summary of one worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub reason: ExitReason,
    pub indexed: u64,
    pub failed: u64,
}

fn handle_index(job_id: u64, command: &CompileCommand) -> WorkerToDriver {
    let arguments = command.arguments_or_split();
    if arguments.is_empty() {
        return WorkerToDriver::failed(job_id, "Empty compiler invocation");
    }
    WorkerToDriver::Indexed {
        job_id,
        file: command.file_path().display().to_string(),
        argument_count: arguments.len(),
    }
}

/// Serve tasks from `pair` until shutdown or until the driver goes idle.
///
/// Undecodable messages are answered with [`WorkerToDriver::Rejected`] and
/// do not stop the loop. Transport failures do.
pub fn run_worker(
    pair: &mut MessageQueuePair,
    options: &IpcOptions,
) -> Result<WorkerReport, IpcError> {
    let mut report = WorkerReport {
        reason: ExitReason::Shutdown,
        indexed: 0,
        failed: 0,
    };
    let mut idle = 0u32;

    pair.to_driver.send(&WorkerToDriver::Ready {
        worker_id: options.worker_id,
    })?;
    info!(worker_id = options.worker_id, "Worker ready");

    loop {
        let request = match pair.to_worker.timed_receive(options.receive_timeout) {
            Ok(request) => {
                idle = 0;
                request
            }
            Err(IpcError::Timeout(wait)) => {
                idle += 1;
                debug!(worker_id = options.worker_id, idle, ?wait, "No task received");
                if idle >= options.max_idle_timeouts.max(1) {
                    warn!(
                        worker_id = options.worker_id,
                        idle, "Driver went quiet, exiting"
                    );
                    report.reason = ExitReason::Idle;
                    return Ok(report);
                }
                continue;
            }
            Err(e @ (IpcError::Schema { .. } | IpcError::Decode(_))) => {
                warn!(worker_id = options.worker_id, error = %e, "Discarding invalid task");
                pair.to_driver.send(&WorkerToDriver::Rejected {
                    message: e.to_string(),
                })?;
                continue;
            }
            Err(e) => return Err(e),
        };

        match request {
            DriverToWorker::Shutdown => {
                info!(
                    worker_id = options.worker_id,
                    indexed = report.indexed,
                    failed = report.failed,
                    "Worker shutting down"
                );
                return Ok(report);
            }
            DriverToWorker::Index { job_id, command } => {
                let response = handle_index(job_id, &command);
                match response {
                    WorkerToDriver::Indexed { .. } => report.indexed += 1,
                    _ => report.failed += 1,
                }
                debug!(worker_id = options.worker_id, job_id, file = %command.file, "Handled task");
                pair.to_driver.send(&response)?;
            }
        }
    }
}
