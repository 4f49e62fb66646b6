//! Kram is a small stack-and-register virtual machine executing a custom
//! little-endian bytecode.
//!
//! The crate provides the instruction set and its bit-packed operand
//! encoding, an editable instruction sequence builder, the self-describing
//! chunk image, a reference-counted heap with a dead-zero sweep, and the
//! execution engine tying them together over one growable call stack.

pub mod assembler;
pub mod buffer;
pub mod builder;
pub mod bytes;
pub mod chunk;
pub mod consts;
pub mod data;
pub mod encoder;
pub mod error;
pub mod heap;
pub mod instruction;
pub mod interpreter;
pub mod operand;
pub mod stack;
pub mod state;

pub mod prelude {
    pub use crate::assembler::{assemble, AsmOpcode, Element, Section, SourceReader};
    pub use crate::buffer::ByteBufferWriter;
    pub use crate::builder::{InstructionBuilder, Location};
    pub use crate::chunk::{
        Chunk, ChunkBuilder, ChunkHandle, FunctionBuilder, FunctionEntry, Program,
    };
    pub use crate::data::{DataSize, DataType, RegisterId, Word};
    pub use crate::error::{
        ChunkError, CompilerError, CompilerErrors, ErrorCode, Fault, VmError,
    };
    pub use crate::heap::Heap;
    pub use crate::instruction::{Instruction, Opcode};
    pub use crate::interpreter::{CallFrame, Interpreter};
    pub use crate::operand::{MemoryLocation, Segment, Split};
    pub use crate::stack::Stack;
    pub use crate::state::{ExecuteState, FrameState};
}
