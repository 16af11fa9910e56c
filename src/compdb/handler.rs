//! Handlers that turn root array objects into compile commands.

use serde_json::Value;
use tracing::trace;

use super::CompileCommand;
use super::reader::{JsonObject, ObjectHandler};

/// Field of a command object.
///
/// The discriminants are bit flags so that the set of fields seen in one
/// object can be tracked as a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FieldKey {
    Unset = 0,
    Directory = 1 << 1,
    File = 1 << 2,
    Arguments = 1 << 3,
    Command = 1 << 4,
    Output = 1 << 5,
}

impl FieldKey {
    /// Map an object key to a field. Unknown keys map to `Unset`.
    pub fn from_key(key: &str) -> Self {
        match key {
            "directory" => Self::Directory,
            "file" => Self::File,
            "arguments" => Self::Arguments,
            "command" => Self::Command,
            "output" => Self::Output,
            _ => Self::Unset,
        }
    }

    pub const fn bit(self) -> u32 {
        self as u32
    }
}

const REQUIRED: u32 = FieldKey::Directory.bit() | FieldKey::File.bit();
const INVOCATION: u32 = FieldKey::Arguments.bit() | FieldKey::Command.bit();

/// Work-in-progress record for one object.
#[derive(Debug, Default)]
struct CommandBuilder {
    wip: CompileCommand,
    seen: u32,
    malformed: bool,
}

impl CommandBuilder {
    fn field(&mut self, key: FieldKey, value: Value) {
        self.seen |= key.bit();
        let wip = &mut self.wip;
        match (key, value) {
            (FieldKey::Unset, _) => {}
            (FieldKey::Directory, Value::String(s)) => wip.directory = s,
            (FieldKey::File, Value::String(s)) => wip.file = s,
            (FieldKey::Command, Value::String(s)) => wip.command = Some(s),
            (FieldKey::Output, Value::String(s)) => wip.output = Some(s),
            // A null `output` is the same as leaving it out.
            (FieldKey::Output, Value::Null) => wip.output = None,
            (FieldKey::Arguments, Value::Array(items)) => match string_items(items) {
                Some(arguments) => wip.arguments = arguments,
                None => self.malformed = true,
            },
            _ => self.malformed = true,
        }
    }

    fn is_well_formed(&self) -> bool {
        let invocation = self.seen & INVOCATION;
        !self.malformed
            && self.seen & REQUIRED == REQUIRED
            && (invocation == FieldKey::Arguments.bit() || invocation == FieldKey::Command.bit())
            && (invocation != FieldKey::Arguments.bit() || !self.wip.arguments.is_empty())
    }
}

/// All elements as strings, or `None` if any element is not a string.
fn string_items(items: Vec<Value>) -> Option<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Rebuilds [`CompileCommand`]s from the objects of a compilation database.
///
/// Malformed objects (missing `directory`/`file`, both or neither of
/// `arguments`/`command`, wrongly typed fields, empty `arguments`) are
/// dropped without raising an error. Once `parse_limit` commands have been
/// collected the handler halts the reader at the end of that object.
#[derive(Debug)]
pub struct CommandObjectHandler {
    parse_limit: usize,
    dropped: usize,
    /// Commands completed since the last [`Self::begin_batch`].
    pub commands: Vec<CompileCommand>,
}

impl CommandObjectHandler {
    pub fn new(parse_limit: usize) -> Self {
        Self {
            parse_limit,
            dropped: 0,
            commands: Vec::new(),
        }
    }

    /// A handler that never halts the reader.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Start a new batch: clears collected commands and sets a new limit.
    pub fn begin_batch(&mut self, parse_limit: usize) {
        self.commands.clear();
        self.parse_limit = parse_limit;
    }

    pub fn reached_limit(&self) -> bool {
        self.commands.len() >= self.parse_limit
    }

    /// Number of malformed objects dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl ObjectHandler for CommandObjectHandler {
    fn object(&mut self, object: JsonObject) -> bool {
        let mut builder = CommandBuilder::default();
        for (key, value) in object {
            builder.field(FieldKey::from_key(&key), value);
        }

        if builder.is_well_formed() {
            self.commands.push(builder.wip);
        } else {
            self.dropped += 1;
            trace!(
                file = %builder.wip.file,
                "Dropping malformed compilation database entry"
            );
        }
        !self.reached_limit()
    }
}

/// Counts the objects of the root array.
#[derive(Debug, Default)]
pub struct JobCounter {
    jobs: usize,
}

impl JobCounter {
    pub fn jobs(&self) -> usize {
        self.jobs
    }
}

impl ObjectHandler for JobCounter {
    fn object(&mut self, _object: JsonObject) -> bool {
        self.jobs += 1;
        true
    }
}
