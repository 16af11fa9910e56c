//! Resumable reader for the root array of a compilation database.
//!
//! The reader scans the `[`, `,` and `]` framing of the root array itself
//! and lets `serde_json` deserialize each element, one object at a time.
//! Between elements the only state is the position in that framing, so an
//! [`ObjectHandler`] can stop the reader after any object and a later
//! [`StreamReader::run`] continues with the next one. Memory use is bounded
//! by the input buffer and the largest single entry.

use std::io::{self, BufRead, Read};

use serde::Deserialize;
use serde_json::error::Category;
use serde_json::{Map, Value};

use crate::error::CompdbError;

/// One element of the root array.
pub type JsonObject = Map<String, Value>;

/// Receiver of the objects in the root array.
pub trait ObjectHandler {
    /// Called once per array element, in document order. Return `false`
    /// to halt the reader right after this object.
    fn object(&mut self, object: JsonObject) -> bool;
}

/// How a call to [`StreamReader::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The handler asked to stop; more input may remain.
    Halted,
    /// The whole document was consumed.
    Finished,
}

/// Next token the framing allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// The opening `[`.
    Open,
    /// An element or `]`.
    FirstElement,
    /// An element, after a comma.
    Element,
    /// `,` or `]`.
    NextElement,
    /// Nothing but whitespace.
    Trailing,
}

enum Step {
    Continue,
    Halt,
    Done,
}

/// Tracks the bytes taken from the inner reader, whether through the
/// framing scan or through `serde_json`.
struct Counted<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> Read for Counted<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Counted<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.offset += amt as u64;
    }
}

/// Pull-based reader that feeds root array objects to an [`ObjectHandler`].
pub struct StreamReader<R> {
    input: Counted<R>,
    expect: Expect,
    finished: bool,
    failed_at: Option<u64>,
}

impl<R: BufRead> StreamReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Counted {
                inner: input,
                offset: 0,
            },
            expect: Expect::Open,
            finished: false,
            failed_at: None,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.input.offset
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed objects to `handler` until it halts, the document ends, or the
    /// input turns out to be invalid.
    ///
    /// After an error the reader is unusable and keeps reporting an error.
    pub fn run<H: ObjectHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> Result<ReadOutcome, CompdbError> {
        if let Some(offset) = self.failed_at {
            return Err(CompdbError::syntax(offset, "reader stopped after an earlier error"));
        }
        if self.finished {
            return Ok(ReadOutcome::Finished);
        }
        loop {
            match self.step(handler) {
                Ok(Step::Continue) => {}
                Ok(Step::Halt) => return Ok(ReadOutcome::Halted),
                Ok(Step::Done) => {
                    self.finished = true;
                    return Ok(ReadOutcome::Finished);
                }
                Err(e) => {
                    self.failed_at = Some(self.offset());
                    return Err(e);
                }
            }
        }
    }

    /// True if the next token closes the root array.
    ///
    /// Only whitespace is consumed, so the next [`Self::run`] is unaffected.
    pub fn next_closes_root(&mut self) -> Result<bool, CompdbError> {
        if self.finished || self.failed_at.is_some() {
            return Ok(false);
        }
        let in_root = matches!(self.expect, Expect::FirstElement | Expect::NextElement);
        Ok(in_root && self.skip_whitespace()? == Some(b']'))
    }

    fn step<H: ObjectHandler + ?Sized>(&mut self, handler: &mut H) -> Result<Step, CompdbError> {
        let Some(byte) = self.skip_whitespace()? else {
            return match self.expect {
                Expect::Trailing => Ok(Step::Done),
                _ => Err(CompdbError::UnexpectedEof {
                    offset: self.offset(),
                }),
            };
        };

        match (self.expect, byte) {
            (Expect::Open, b'[') => {
                self.bump();
                self.expect = Expect::FirstElement;
                Ok(Step::Continue)
            }
            (Expect::Open, _) => Err(CompdbError::syntax(
                self.offset(),
                "compilation database must be a JSON array",
            )),
            (Expect::FirstElement | Expect::NextElement, b']') => {
                self.bump();
                self.expect = Expect::Trailing;
                Ok(Step::Continue)
            }
            (Expect::NextElement, b',') => {
                self.bump();
                self.expect = Expect::Element;
                Ok(Step::Continue)
            }
            (Expect::NextElement, _) => Err(self.unexpected(byte, "',' or ']'")),
            (Expect::FirstElement | Expect::Element, b'{') => self.element(handler),
            (Expect::FirstElement | Expect::Element, b']') => {
                Err(self.unexpected(byte, "an object"))
            }
            (Expect::FirstElement | Expect::Element, _) => Err(CompdbError::syntax(
                self.offset(),
                "compilation database entries must be objects",
            )),
            (Expect::Trailing, _) => Err(self.unexpected(byte, "end of input")),
        }
    }

    /// Deserialize the object starting at the current `{`.
    ///
    /// `serde_json` stops reading at the closing brace, so nothing past the
    /// element is consumed.
    fn element<H: ObjectHandler + ?Sized>(&mut self, handler: &mut H) -> Result<Step, CompdbError> {
        let start = self.offset();
        let parsed =
            JsonObject::deserialize(&mut serde_json::Deserializer::from_reader(&mut self.input));
        let object = parsed.map_err(|e| self.element_error(start, e))?;

        self.expect = Expect::NextElement;
        Ok(if handler.object(object) {
            Step::Continue
        } else {
            Step::Halt
        })
    }

    fn element_error(&self, start: u64, error: serde_json::Error) -> CompdbError {
        match error.classify() {
            Category::Eof => CompdbError::UnexpectedEof {
                offset: self.offset(),
            },
            Category::Io => CompdbError::Io(error.into()),
            Category::Syntax | Category::Data => CompdbError::syntax(
                self.offset(),
                format!("invalid entry starting at byte {}: {}", start, error),
            ),
        }
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>, CompdbError> {
        loop {
            let buf = self.input.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let skipped = buf
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
                .count();
            let next = buf.get(skipped).copied();
            self.input.consume(skipped);
            if next.is_some() {
                return Ok(next);
            }
        }
    }

    fn bump(&mut self) {
        self.input.consume(1);
    }

    fn unexpected(&self, byte: u8, wanted: &str) -> CompdbError {
        CompdbError::syntax(
            self.offset(),
            format!("expected {}, found '{}'", wanted, byte.escape_ascii()),
        )
    }
}
