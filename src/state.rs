//! Runtime state representation for the VM.

use crate::data::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Resulting state of a single instruction execution.
pub enum ExecuteState {
    /// The VM should proceed normally with the execution.
    Proceed,
    /// The outermost frame returned; the word is the `sr` register.
    Return(Word),
}

impl ExecuteState {
    /// Return true if the VM execution should continue.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl Default for ExecuteState {
    fn default() -> Self {
        Self::Proceed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Lifecycle of one call frame.
pub enum FrameState {
    /// Built but not yet executing.
    Initialized,
    /// Currently executing, or suspended below a callee.
    Running,
    /// Popped by a return.
    Returned,
    /// Terminated by a fatal fault.
    Faulted,
}
