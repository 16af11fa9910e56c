//! compdb-ipc - streaming compilation-database feed and JSON message queues
//! for multi-process source indexers.

pub mod compdb;
pub mod error;
pub mod ipc;
pub mod logging;
