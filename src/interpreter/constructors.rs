//! Exposed constructors API for the [`Interpreter`]

use super::Interpreter;
use crate::chunk::Program;
use crate::consts::VM_REGISTER_COUNT;
use crate::error::ErrorCode;
use crate::heap::Heap;
use crate::stack::Stack;

impl Interpreter {
    /// Create an interpreter over a loaded program with the default stack
    /// and heap sizes.
    pub fn new(program: Program) -> Self {
        Self {
            registers: [0; VM_REGISTER_COUNT],
            stack: Stack::default(),
            heap: Heap::default(),
            program,
            frames: vec![],
            error: ErrorCode::Ok,
            fault: None,
            exit: false,
        }
    }

    /// Create an interpreter with explicit stack and heap sizes.
    pub fn with_config(program: Program, stack_size: usize, heap_capacity: usize) -> Self {
        Self {
            stack: Stack::build(stack_size),
            heap: Heap::with_capacity(heap_capacity),
            ..Self::new(program)
        }
    }

    /// Interpreter with an empty program, for driving single instructions.
    pub fn bare() -> Self {
        Self::new(Program::new())
    }
}
