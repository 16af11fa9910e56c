//! Batch-at-a-time parsing of a compilation database.

use std::fs::File;
use std::io::BufReader;

use tracing::{debug, instrument};

use super::handler::CommandObjectHandler;
use super::reader::{ReadOutcome, StreamReader};
use super::{CompilationDatabaseFile, CompileCommand};
use crate::error::CompdbError;

/// Default size of the read buffer (64KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

struct Binding {
    reader: StreamReader<BufReader<File>>,
    handler: CommandObjectHandler,
    refill_count: usize,
}

/// Pulls compile commands out of a compilation database in bounded batches.
///
/// Each [`parse_more`](Self::parse_more) call resumes the stream where the
/// previous call stopped, so the file is read exactly once no matter how
/// many batches are requested.
pub struct ResumableParser {
    buffer_size: usize,
    binding: Option<Binding>,
    exhausted: bool,
}

impl Default for ResumableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumableParser {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a parser whose read buffer holds `buffer_size` bytes.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            binding: None,
            exhausted: false,
        }
    }

    /// Bind the parser to a compilation database.
    ///
    /// `refill_count` is the maximum number of commands returned by each
    /// [`parse_more`](Self::parse_more) call; zero is treated as one.
    /// A parser can only be initialized once.
    pub fn initialize(
        &mut self,
        compdb: CompilationDatabaseFile,
        refill_count: usize,
    ) -> Result<(), CompdbError> {
        if self.binding.is_some() {
            return Err(CompdbError::AlreadyInitialized);
        }
        let refill_count = refill_count.max(1);
        let input = BufReader::with_capacity(self.buffer_size, compdb.into_file());
        self.binding = Some(Binding {
            reader: StreamReader::new(input),
            handler: CommandObjectHandler::new(refill_count),
            refill_count,
        });
        Ok(())
    }

    /// True once the end of the document has been reached or the stream
    /// failed. Further [`parse_more`](Self::parse_more) calls append nothing.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Append up to `refill_count` newly parsed commands to `out`.
    ///
    /// Returns how many commands were appended. Fewer than `refill_count`
    /// means the input is exhausted.
    ///
    /// On a syntax error, commands completed before the error are still
    /// appended to `out` before the error is returned.
    #[instrument(level = "debug", skip_all)]
    pub fn parse_more(&mut self, out: &mut Vec<CompileCommand>) -> Result<usize, CompdbError> {
        let binding = self.binding.as_mut().ok_or(CompdbError::NotInitialized)?;
        if self.exhausted {
            return Ok(0);
        }

        let Binding {
            reader,
            handler,
            refill_count,
        } = binding;
        handler.begin_batch(*refill_count);

        let mut result = reader.run(&mut *handler);
        // A full batch that ends right before the closing bracket is the last
        // one; finish the document now so the caller sees exhaustion.
        if matches!(result, Ok(ReadOutcome::Halted)) && handler.reached_limit() {
            match reader.next_closes_root() {
                Ok(true) => result = reader.run(&mut *handler),
                Ok(false) => {}
                Err(e) => result = Err(e),
            }
        }

        let appended = handler.commands.len();
        out.append(&mut handler.commands);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.exhausted = true;
                debug!(appended, error = %e, "Compilation database parse failed");
                return Err(e);
            }
        };

        if outcome == ReadOutcome::Finished {
            self.exhausted = true;
        }
        debug!(
            appended,
            dropped = handler.dropped(),
            offset = reader.offset(),
            exhausted = self.exhausted,
            "Parsed compilation database batch"
        );
        Ok(appended)
    }
}
