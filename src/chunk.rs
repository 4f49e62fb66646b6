//! Chunk images and their builders.
//!
//! A chunk is one owned byte block partitioned into four regions at fixed
//! offsets:
//!
//! ```text
//! [ connections | statics | function table | code ]
//! ```
//!
//! Connections are 8-byte little-endian handles of other chunks, resolved
//! against the [`Program`] at load. Function entries are 24 bytes:
//! `parameter_count`, `stack_count` and `code_offset`, each a 64-bit word;
//! `code_offset` is relative to the start of the code region.

use crate::buffer::ByteBufferWriter;
use crate::builder::InstructionBuilder;
use crate::bytes;
use crate::consts::WORD_SIZE;
use crate::data::{DataSize, Word};
use crate::error::ChunkError;

/// Handle of a loaded chunk inside a [`Program`].
pub type ChunkHandle = usize;

/// Encoded size of one function table entry.
pub const FUNCTION_ENTRY_SIZE: usize = 3 * WORD_SIZE;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// One function descriptor of a chunk.
pub struct FunctionEntry {
    /// Bytes of parameters the caller places on the stack.
    pub parameter_count: Word,
    /// Bytes of local scratch reserved in the frame.
    pub stack_count: Word,
    /// Byte offset of the function's code inside the code region.
    pub code_offset: Word,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    data: Vec<u8>,
    connection_count: usize,
    static_bytes: usize,
    function_count: usize,
    code_bytes: usize,
}

impl Chunk {
    pub fn connection_count(&self) -> usize {
        self.connection_count
    }

    pub fn static_count(&self) -> usize {
        self.static_bytes
    }

    pub fn function_count(&self) -> usize {
        self.function_count
    }

    pub fn code_count(&self) -> usize {
        self.code_bytes
    }

    /// Whole image.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub const fn connections_offset(&self) -> usize {
        0
    }

    pub fn statics_offset(&self) -> usize {
        self.connection_count * WORD_SIZE
    }

    pub fn functions_offset(&self) -> usize {
        self.statics_offset() + self.static_bytes
    }

    pub fn code_region_offset(&self) -> usize {
        self.functions_offset() + self.function_count * FUNCTION_ENTRY_SIZE
    }

    pub fn connection(&self, index: usize) -> Option<ChunkHandle> {
        if index >= self.connection_count {
            return None;
        }
        let offset = self.connections_offset() + index * WORD_SIZE;
        bytes::read_scalar_le(&self.data[offset..], DataSize::QuadWord).map(|handle| handle as ChunkHandle)
    }

    pub fn statics(&self) -> &[u8] {
        let offset = self.statics_offset();
        &self.data[offset..offset + self.static_bytes]
    }

    /// Statics are the only writable region of a loaded chunk.
    pub fn statics_mut(&mut self) -> &mut [u8] {
        let offset = self.statics_offset();
        let end = offset + self.static_bytes;
        &mut self.data[offset..end]
    }

    pub fn function(&self, index: usize) -> Option<FunctionEntry> {
        if index >= self.function_count {
            return None;
        }
        let offset = self.functions_offset() + index * FUNCTION_ENTRY_SIZE;

        Some(FunctionEntry {
            parameter_count: bytes::read_scalar_le(&self.data[offset..], DataSize::QuadWord)?,
            stack_count: bytes::read_scalar_le(&self.data[offset + WORD_SIZE..], DataSize::QuadWord)?,
            code_offset: bytes::read_scalar_le(&self.data[offset + 2 * WORD_SIZE..], DataSize::QuadWord)?,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionEntry> + '_ {
        (0..self.function_count).filter_map(|index| self.function(index))
    }

    pub fn code(&self) -> &[u8] {
        let offset = self.code_region_offset();
        &self.data[offset..offset + self.code_bytes]
    }
}

#[derive(Debug, Default, Clone)]
/// Parameter count, local stack size and code of one function under
/// construction.
pub struct FunctionBuilder {
    parameters: Word,
    stack_size: Word,
    code: InstructionBuilder,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parameters(&mut self, parameters: Word) -> &mut Self {
        self.parameters = parameters;
        self
    }

    pub fn set_stack_size(&mut self, stack_size: Word) -> &mut Self {
        self.stack_size = stack_size;
        self
    }

    pub fn set_code(&mut self, code: InstructionBuilder) -> &mut Self {
        self.code = code;
        self
    }

    pub fn parameters(&self) -> Word {
        self.parameters
    }

    pub fn stack_size(&self) -> Word {
        self.stack_size
    }

    pub fn code(&self) -> &InstructionBuilder {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut InstructionBuilder {
        &mut self.code
    }
}

#[derive(Debug, Default, Clone)]
/// Computes region sizes, allocates one block and writes the four regions
/// of a chunk image in place.
pub struct ChunkBuilder {
    statics: Vec<usize>,
    functions: Vec<FunctionBuilder>,
    connections: Vec<ChunkHandle>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_static(&mut self, size: usize) -> &mut Self {
        self.statics.push(size);
        self
    }

    pub fn add_function(&mut self, function: FunctionBuilder) -> &mut Self {
        self.functions.push(function);
        self
    }

    pub fn add_connection(&mut self, chunk: ChunkHandle) -> &mut Self {
        self.connections.push(chunk);
        self
    }

    pub fn build(self) -> Result<Chunk, ChunkError> {
        let connections_bytes = self.connections.len() * WORD_SIZE;
        let static_bytes = self
            .statics
            .iter()
            .try_fold(0usize, |sum, &size| sum.checked_add(size))
            .ok_or(ChunkError::RegionOverflow)?;
        let functions_bytes = self.functions.len() * FUNCTION_ENTRY_SIZE;

        let code_sizes: Vec<usize> = self
            .functions
            .iter()
            .map(|function| function.code.byte_count())
            .collect();
        let code_bytes = code_sizes
            .iter()
            .try_fold(0usize, |sum, &size| sum.checked_add(size))
            .ok_or(ChunkError::RegionOverflow)?;

        let total = connections_bytes
            .checked_add(static_bytes)
            .and_then(|sum| sum.checked_add(functions_bytes))
            .and_then(|sum| sum.checked_add(code_bytes))
            .ok_or(ChunkError::RegionOverflow)?;

        let mut image = ByteBufferWriter::with_capacity(total);

        for &connection in &self.connections {
            image.write_u64(connection as Word);
        }

        image.write_zeros(static_bytes);

        let mut code_offset = 0u64;
        for (function, &size) in self.functions.iter().zip(&code_sizes) {
            image.write_u64(function.parameters);
            image.write_u64(function.stack_size);
            image.write_u64(code_offset);
            code_offset += size as Word;
        }

        for function in &self.functions {
            function.code.build_into(&mut image);
        }

        Ok(Chunk {
            data: image.extract(),
            connection_count: self.connections.len(),
            static_bytes,
            function_count: self.functions.len(),
            code_bytes,
        })
    }
}

#[derive(Debug, Default, Clone)]
/// Owner of every loaded chunk; handles are indices into the load order.
pub struct Program {
    chunks: Vec<Chunk>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a chunk, resolving its connections against the chunks already
    /// present. A connection to a not-yet-loaded chunk is an error, so
    /// children load before their parents.
    pub fn add_chunk(&mut self, chunk: Chunk) -> Result<ChunkHandle, ChunkError> {
        for index in 0..chunk.connection_count() {
            match chunk.connection(index) {
                Some(handle) if handle < self.chunks.len() => {}
                _ => return Err(ChunkError::UnknownConnection { index }),
            }
        }

        self.chunks.push(chunk);
        Ok(self.chunks.len() - 1)
    }

    pub fn chunk(&self, handle: ChunkHandle) -> Option<&Chunk> {
        self.chunks.get(handle)
    }

    pub fn chunk_mut(&mut self, handle: ChunkHandle) -> Option<&mut Chunk> {
        self.chunks.get_mut(handle)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
