//! Messages exchanged between a driver and its workers.
//!
//! Each value is one queue message; the queue supplies the framing.

use serde::{Deserialize, Serialize};

use crate::compdb::CompileCommand;

/// Message from driver to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DriverToWorker {
    /// Analyze one translation unit.
    #[serde(rename = "index")]
    Index {
        /// Driver-assigned id echoed back in the reply.
        job_id: u64,
        command: CompileCommand,
    },

    /// Graceful shutdown request.
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Message from worker to driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerToDriver {
    /// Worker attached to its queues and is waiting for work.
    #[serde(rename = "ready")]
    Ready { worker_id: u32 },

    /// Job finished.
    #[serde(rename = "indexed")]
    Indexed {
        job_id: u64,
        /// Resolved path of the main source file.
        file: String,
        /// Number of tokens in the compiler invocation.
        argument_count: usize,
    },

    /// Job could not be processed.
    #[serde(rename = "failed")]
    Failed { job_id: u64, message: String },

    /// A message from the driver could not be decoded and was discarded.
    #[serde(rename = "rejected")]
    Rejected { message: String },
}

impl DriverToWorker {
    pub fn index(job_id: u64, command: CompileCommand) -> Self {
        Self::Index { job_id, command }
    }
}

impl WorkerToDriver {
    pub fn failed(job_id: u64, message: impl Into<String>) -> Self {
        Self::Failed {
            job_id,
            message: message.into(),
        }
    }

    /// Job id this message answers, if any.
    pub fn job_id(&self) -> Option<u64> {
        match self {
            Self::Ready { .. } | Self::Rejected { .. } => None,
            Self::Indexed { job_id, .. } | Self::Failed { job_id, .. } => Some(*job_id),
        }
    }
}
