//! Call frames: establishment, teardown and the saved register image.
//!
//! Frame layout on the stack, bottom to top: the caller's register image
//! (saved immediately below the callee's frame base), the callee's local
//! stack slots, then the parameter area. `sp` marks the start of the
//! parameter area; the caller fills the parameter bytes at the top of its
//! own region before the call and the engine moves them into place.

use super::Interpreter;
use crate::chunk::ChunkHandle;
use crate::consts::{
    CALL_STACK_LIMIT, REGISTER_IMAGE_SIZE, REG_CH, REG_IP, REG_SB, REG_SD, REG_SP, REG_SR, REG_ST,
    VM_REGISTER_COUNT, WORD_SIZE,
};
use crate::data::Word;
use crate::error::Fault;
use crate::state::{ExecuteState, FrameState};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Bookkeeping for one active call.
pub struct CallFrame {
    chunk: ChunkHandle,
    function: Word,
    image_base: Word,
    state: FrameState,
}

impl CallFrame {
    pub const fn chunk(&self) -> ChunkHandle {
        self.chunk
    }

    pub const fn function(&self) -> Word {
        self.function
    }

    /// Stack offset of the saved register image, which sits immediately
    /// below this frame's base.
    pub const fn image_base(&self) -> Word {
        self.image_base
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: FrameState) {
        self.state = state;
    }
}

impl Interpreter {
    /// Establish a frame for `function` of `chunk` and jump to its code.
    ///
    /// The caller must have filled the top `parameter_count` bytes below
    /// `st` with the outgoing parameters.
    pub(crate) fn call_in_chunk(&mut self, chunk: ChunkHandle, function: Word) -> Result<(), Fault> {
        if self.frames.len() >= CALL_STACK_LIMIT {
            return Err(Fault::CallStackOverflow);
        }

        let entry = self
            .program
            .chunk(chunk)
            .ok_or(Fault::ChunkNotFound(chunk as Word))?
            .function(function as usize)
            .ok_or(Fault::FunctionNotFound(function))?;

        let st = self.registers[REG_ST] as usize;
        let params = entry.parameter_count as usize;
        let locals = entry.stack_count as usize;
        let param_src = st.checked_sub(params).ok_or(Fault::StackUnderflow)?;

        // grow early once less than half the region is free, then make the
        // exact frame fit; offsets survive the relocation
        let free = self.stack.len().saturating_sub(st);
        if free < self.stack.len() / 2 {
            self.stack.resize(0)?;
        }
        let required = st + REGISTER_IMAGE_SIZE + locals + params;
        if required > self.stack.len() {
            self.stack.resize(required - self.stack.len())?;
        }

        for (index, value) in self.registers.iter().enumerate() {
            let offset = st + index * WORD_SIZE;
            self.stack.bytes_mut()[offset..offset + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
        }

        let sb = st + REGISTER_IMAGE_SIZE;
        let sp = sb + locals;
        let top = sp + params;

        self.stack.bytes_mut().copy_within(param_src..st, sp);
        self.stack.bytes_mut()[sb..sp].fill(0);

        self.registers[REG_SB] = sb as Word;
        self.registers[REG_SP] = sp as Word;
        self.registers[REG_ST] = top as Word;
        self.registers[REG_CH] = chunk as Word;
        self.registers[REG_SD] = self.statics_base(chunk);
        self.registers[REG_IP] = entry.code_offset;

        self.frames.push(CallFrame {
            chunk,
            function,
            image_base: st as Word,
            state: FrameState::Initialized,
        });

        debug!(chunk, function, frame_base = sb, "call frame established");

        Ok(())
    }

    /// Pop the current frame, restoring the saved register image except
    /// for `sr`, which carries the callee's return value. Returning from
    /// the outermost frame ends the run.
    pub(crate) fn return_from_frame(&mut self) -> Result<ExecuteState, Fault> {
        let frame = self.frames.pop().ok_or(Fault::CallStackUnderflow)?;
        let image = frame.image_base as usize;

        for index in 0..VM_REGISTER_COUNT {
            if index == REG_SR {
                continue;
            }
            let offset = image + index * WORD_SIZE;
            let mut raw = [0u8; WORD_SIZE];
            raw.copy_from_slice(&self.stack.bytes()[offset..offset + WORD_SIZE]);
            self.registers[index] = Word::from_le_bytes(raw);
        }

        debug!(
            chunk = frame.chunk,
            function = frame.function,
            sr = self.registers[REG_SR],
            "frame returned"
        );

        if self.frames.is_empty() {
            self.exit = true;
            Ok(ExecuteState::Return(self.registers[REG_SR]))
        } else {
            Ok(ExecuteState::Proceed)
        }
    }
}
