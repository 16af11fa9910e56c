//! Error types for compdb-ipc.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// Errors from opening or streaming a compilation database.
#[derive(Error, Debug)]
pub enum CompdbError {
    #[error("Failed to open compilation database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Compilation database {} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("IO error while reading compilation database: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },

    #[error("Unexpected end of JSON input at byte {offset}")]
    UnexpectedEof { offset: u64 },

    #[error("Parser is already bound to a compilation database")]
    AlreadyInitialized,

    #[error("Parser used before initialize()")]
    NotInitialized,
}

impl CompdbError {
    pub(crate) fn syntax(offset: u64, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Errors from the JSON message queues.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to create queue '{name}': {source}")]
    Create {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Failed to open queue '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Invalid queue name '{0}'")]
    InvalidName(String),

    #[error("Message of {size} bytes exceeds queue limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Queue transport error: {0}")]
    Transport(#[source] Errno),

    #[error("Timeout after {0:?} when receiving from queue")]
    Timeout(Duration),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Received message is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Received message does not match expected shape at {path}: {message}")]
    Schema { path: String, message: String },
}

impl IpcError {
    /// True when a receive gave up because nothing arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Coarse classification compatible with `std::io::ErrorKind`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Timeout(_) => io::ErrorKind::TimedOut,
            Self::Create { source, .. } if *source == Errno::EEXIST => {
                io::ErrorKind::AlreadyExists
            }
            Self::Open { source, .. } if *source == Errno::ENOENT => io::ErrorKind::NotFound,
            Self::InvalidName(_) => io::ErrorKind::InvalidInput,
            Self::MessageTooLarge { .. } => io::ErrorKind::InvalidInput,
            Self::Encode(_) | Self::Decode(_) | Self::Schema { .. } => io::ErrorKind::InvalidData,
            Self::Create { source, .. } | Self::Open { source, .. } | Self::Transport(source) => {
                io::Error::from_raw_os_error(*source as i32).kind()
            }
        }
    }
}

impl From<IpcError> for io::Error {
    fn from(err: IpcError) -> Self {
        io::Error::new(err.kind(), err)
    }
}
