//! Compilation database ingestion.
//!
//! A compilation database (`compile_commands.json`) is a JSON array with one
//! object per translation unit. Real databases can run to hundreds of
//! megabytes, so nothing here materializes the whole document: a
//! [`reader::StreamReader`] walks the root array and deserializes one
//! element at a time, and a [`handler::CommandObjectHandler`] validates each
//! element into a [`CompileCommand`]. [`parser::ResumableParser`] hands the records out in
//! fixed-size batches.
//!
//! ```no_run
//! use compdb_ipc::compdb::{CompilationDatabaseFile, ResumableParser};
//!
//! let file = CompilationDatabaseFile::open("compile_commands.json")?;
//! let mut parser = ResumableParser::new();
//! parser.initialize(file, 64)?;
//!
//! let mut batch = Vec::new();
//! while !parser.is_exhausted() {
//!     batch.clear();
//!     parser.parse_more(&mut batch)?;
//!     // dispatch batch...
//! }
//! # Ok::<(), compdb_ipc::error::CompdbError>(())
//! ```

pub mod handler;
pub mod parser;
pub mod reader;

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CompdbError;

pub use handler::{CommandObjectHandler, FieldKey, JobCounter};
pub use parser::ResumableParser;
pub use reader::{JsonObject, ObjectHandler, ReadOutcome, StreamReader};

/// Rough size of one command object, used to pre-size buffers.
const ESTIMATED_BYTES_PER_JOB: u64 = 256;

/// One validated entry of a compilation database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// Working directory of the compiler invocation.
    pub directory: String,
    /// Main source file.
    pub file: String,
    /// Tokenized invocation. Empty when `command` is used instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// Shell-quoted invocation, the alternative to `arguments`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Output path hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CompileCommand {
    /// Absolute path of the source file, resolving it against `directory`.
    pub fn file_path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.file)
    }

    /// The invocation as a token list.
    ///
    /// Uses `arguments` when present, otherwise splits `command` with POSIX
    /// shell quoting rules. A command with unbalanced quotes falls back to
    /// plain whitespace splitting.
    pub fn arguments_or_split(&self) -> Vec<String> {
        if !self.arguments.is_empty() {
            return self.arguments.clone();
        }
        let Some(command) = self.command.as_deref() else {
            return Vec::new();
        };
        shlex::split(command)
            .unwrap_or_else(|| command.split_whitespace().map(String::from).collect())
    }
}

/// An opened compilation database on disk.
#[derive(Debug)]
pub struct CompilationDatabaseFile {
    file: File,
    path: PathBuf,
    size_in_bytes: u64,
    num_jobs: usize,
}

impl CompilationDatabaseFile {
    /// Open a compilation database for reading.
    ///
    /// The job count is an estimate derived from the file size and is only
    /// meant for buffer pre-allocation. Use [`Self::count_jobs`] for an
    /// exact number.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CompdbError> {
        let path = path.as_ref();
        let open_err = |source| CompdbError::Open {
            path: path.to_path_buf(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(open_err)?;
        if !metadata.is_file() {
            return Err(CompdbError::NotAFile(path.to_path_buf()));
        }
        let file = File::open(path).map_err(open_err)?;

        let size_in_bytes = metadata.len();
        let num_jobs = estimate_jobs(size_in_bytes);
        debug!(?path, size_in_bytes, num_jobs, "Opened compilation database");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size_in_bytes,
            num_jobs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    /// Estimated number of command objects.
    pub fn num_jobs(&self) -> usize {
        self.num_jobs
    }

    /// Count the command objects exactly with a full streaming pass.
    ///
    /// Fails if the document is not an array of objects. The handle is
    /// rewound afterwards, whether or not counting succeeded, so the file can
    /// still be handed to a parser.
    pub fn count_jobs(&mut self) -> Result<usize, CompdbError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut counter = JobCounter::default();
        let counted = StreamReader::new(BufReader::new(&self.file)).run(&mut counter);
        // Rewind before reporting a failed count too.
        self.file.seek(SeekFrom::Start(0))?;
        counted?;

        self.num_jobs = counter.jobs();
        Ok(self.num_jobs)
    }

    pub(crate) fn into_file(self) -> File {
        self.file
    }
}

fn estimate_jobs(size_in_bytes: u64) -> usize {
    if size_in_bytes == 0 {
        return 0;
    }
    (size_in_bytes / ESTIMATED_BYTES_PER_JOB).max(1) as usize
}
