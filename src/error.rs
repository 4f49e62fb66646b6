//! Runtime and compiler error types.

use crate::data::Word;

use itertools::Itertools;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
/// Reasons the execution engine stops with a fatal, typed error.
pub enum Fault {
    /// The byte at the instruction pointer does not name an opcode.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// An instruction's operands run past the end of the code region.
    #[error("truncated operands at the end of the code region")]
    TruncatedOperand,
    /// An operand carried an invalid data type id.
    #[error("invalid data type id {0:#04x}")]
    InvalidDataType(u8),
    /// Too many active call frames.
    #[error("call stack overflow")]
    CallStackOverflow,
    /// Return without an active call frame.
    #[error("call stack underflow")]
    CallStackUnderflow,
    /// The stack region cannot grow any further.
    #[error("stack region exhausted")]
    StackOverflow,
    /// A frame needs more parameter bytes than the stack holds.
    #[error("stack underflow while building a frame")]
    StackUnderflow,
    /// The heap arena cannot fit the requested block.
    #[error("heap region exhausted")]
    HeapExhausted,
    /// The address does not reference a live heap block.
    #[error("pointer does not reference a live heap block")]
    BadHeapPointer,
    /// A load or store fell outside its region's bounds.
    #[error("memory access out of region bounds")]
    MemoryOverflow,
    /// The chunk handle does not name a loaded chunk.
    #[error("chunk handle {0} out of range")]
    ChunkNotFound(Word),
    /// The function index is not in the chunk's function table.
    #[error("function index {0} out of range")]
    FunctionNotFound(Word),
    /// The connection index is not in the chunk's connection table.
    #[error("connection index {0} out of range")]
    ConnectionNotFound(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
/// In-band error code on the runtime state. Recoverable conditions land
/// here (and in `sr`) instead of terminating execution.
pub enum ErrorCode {
    #[default]
    Ok = 0x00,
    /// `NEW` could not allocate; the destination received a null address.
    HeapOverflow = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Errors detected while assembling a chunk image.
pub enum ChunkError {
    /// The summed region sizes exceed the addressable image size.
    #[error("chunk regions exceed the addressable image size")]
    RegionOverflow,
    /// A connection references a chunk that is not loaded yet.
    #[error("connection {index} references an unknown chunk")]
    UnknownConnection { index: usize },
}

#[derive(Debug, Error)]
/// Top-level error of the virtual machine public API.
pub enum VmError {
    /// Execution stopped on a fatal fault.
    #[error("execution fault: {0}")]
    Fault(#[from] Fault),
    /// A chunk image could not be built or loaded.
    #[error("malformed chunk: {0}")]
    Chunk(#[from] ChunkError),
    /// The requested entry point does not exist.
    #[error("entry function {function} of chunk {chunk} not found")]
    EntryNotFound { chunk: usize, function: Word },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A compiler diagnostic, optionally tied to a source position.
pub struct CompilerError {
    message: String,
    position: Option<(usize, usize)>,
}

impl CompilerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(message: impl Into<String>, row: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            position: Some((row, column)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<(usize, usize)> {
        self.position
    }

    pub fn row(&self) -> Option<usize> {
        self.position.map(|(row, _)| row)
    }

    pub fn column(&self) -> Option<usize> {
        self.position.map(|(_, column)| column)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some((row, column)) => write!(f, "{}:{}: {}", row, column, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CompilerError {}

/// Wrapping any other error keeps only its message.
impl From<VmError> for CompilerError {
    fn from(error: VmError) -> Self {
        Self::new(error.to_string())
    }
}

impl From<ChunkError> for CompilerError {
    fn from(error: ChunkError) -> Self {
        Self::new(error.to_string())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// Ordered collection of compiler diagnostics.
pub struct CompilerErrors {
    errors: Vec<CompilerError>,
}

impl CompilerErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<CompilerError>) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompilerError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompilerError> {
        self.errors.iter()
    }
}

impl fmt::Display for CompilerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.iter().map(CompilerError::to_string).join("\n"))
    }
}

impl IntoIterator for CompilerErrors {
    type Item = CompilerError;
    type IntoIter = std::vec::IntoIter<CompilerError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
