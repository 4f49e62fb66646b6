//! Fetch-decode-execute loop.

use super::Interpreter;
use crate::chunk::ChunkHandle;
use crate::consts::{REG_CH, REG_IP, REG_SR, REG_ST};
use crate::data::{self, DataSize, RegisterId, Word};
use crate::encoder::{self, Op};
use crate::error::{ErrorCode, Fault, VmError};
use crate::instruction::Instruction;
use crate::state::{ExecuteState, FrameState};

use tracing::debug;

impl Interpreter {
    /// Run `function` of `chunk` to completion with `params` as the entry
    /// parameter bytes. Returns the final `sr` register.
    ///
    /// Fatal faults terminate with a typed error; recoverable conditions
    /// (a full heap) land in [`Interpreter::error_code`] and `sr`.
    pub fn run(&mut self, chunk: ChunkHandle, function: Word, params: &[u8]) -> Result<Word, VmError> {
        self.reset();

        self.program
            .chunk(chunk)
            .and_then(|chunk| chunk.function(function as usize))
            .ok_or(VmError::EntryNotFound { chunk, function })?;

        if params.len() > self.stack.len() {
            let extra = params.len() - self.stack.len();
            self.stack.resize(extra).map_err(|fault| self.fail(fault))?;
        }
        self.stack.bytes_mut()[..params.len()].copy_from_slice(params);
        self.registers[REG_ST] = params.len() as Word;
        self.registers[REG_CH] = chunk as Word;

        self.call_in_chunk(chunk, function)
            .map_err(|fault| self.fail(fault))?;

        while !self.exit {
            match self.step() {
                Ok(state) => {
                    if !state.should_continue() {
                        self.exit = true;
                    }
                }
                Err(fault) => return Err(self.fail(fault)),
            }
        }

        Ok(self.registers[REG_SR])
    }

    fn reset(&mut self) {
        self.registers = [0; crate::consts::VM_REGISTER_COUNT];
        self.frames.clear();
        self.error = ErrorCode::Ok;
        self.fault = None;
        self.exit = false;
    }

    fn fail(&mut self, fault: Fault) -> VmError {
        if let Some(frame) = self.frames.last_mut() {
            frame.set_state(FrameState::Faulted);
        }
        self.fault = Some(fault);
        self.exit = true;

        debug!(?fault, "execution faulted");

        VmError::Fault(fault)
    }

    /// Fetch, decode and execute the instruction under `ip`, advancing it.
    /// The run ends when `ip` passes the code region's last byte.
    pub(crate) fn step(&mut self) -> Result<ExecuteState, Fault> {
        if let Some(frame) = self.frames.last_mut() {
            frame.set_state(FrameState::Running);
        }

        let chunk = self.registers[REG_CH] as ChunkHandle;
        let ip = self.registers[REG_IP] as usize;

        let (op, next) = {
            let code = self
                .program
                .chunk(chunk)
                .ok_or(Fault::ChunkNotFound(chunk as Word))?
                .code();
            if ip >= code.len() {
                self.exit = true;
                return Ok(ExecuteState::Return(self.registers[REG_SR]));
            }
            encoder::decode_op(code, ip)?
        };

        self.registers[REG_IP] = next as Word;
        self.perform(op)
    }

    /// Execute one already-built instruction outside the dispatch loop.
    /// `ip` is not advanced; call and return still retarget it.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<ExecuteState, VmError> {
        let bytes = instruction.to_bytes();
        let (op, _) = encoder::decode_op(&bytes, 0).map_err(|fault| self.fail(fault))?;
        self.perform(op).map_err(|fault| self.fail(fault))
    }

    fn write_register_sized(&mut self, reg: RegisterId, size: DataSize, value: Word) {
        let mask = size.mask();
        self.registers[reg] = (self.registers[reg] & !mask) | (value & mask);
    }

    /// Heap allocation with the recoverable failure path: on exhaustion
    /// the error code is set, surfaced through `sr`, and the destination
    /// receives the null address.
    fn heap_alloc(&mut self, count: Word, add_ref: bool) -> Word {
        match self.heap.malloc(count as usize, add_ref) {
            Ok(payload) => self.heap_address(payload),
            Err(_) => {
                self.error = ErrorCode::HeapOverflow;
                self.registers[REG_SR] = ErrorCode::HeapOverflow as u8 as Word;
                0
            }
        }
    }

    fn perform(&mut self, op: Op) -> Result<ExecuteState, Fault> {
        match op {
            Op::Nop => {}

            Op::MovRR { size, dst, src } => {
                let value = self.registers[src];
                self.write_register_sized(dst, size, value);
            }

            Op::MovRM { size, dst, src } => {
                let value = self.load_scalar(self.effective(&src), size)?;
                self.write_register_sized(dst, size, value);
            }

            Op::MovRI { size, dst, imm } => {
                self.write_register_sized(dst, size, imm);
            }

            Op::MovMR { size, dst, src } => {
                let value = self.registers[src];
                self.store_scalar(self.effective(&dst), size, value)?;
            }

            Op::MovMI { size, dst, imm } => {
                self.store_scalar(self.effective(&dst), size, imm)?;
            }

            Op::MovMM { size, dst, src } => {
                let value = self.load_scalar(self.effective(&src), size)?;
                self.store_scalar(self.effective(&dst), size, value)?;
            }

            Op::Lea { dst, src } => {
                self.registers[dst] = self.effective(&src);
            }

            Op::Mmb { dst, src, count } => {
                self.copy_block(self.registers[dst], self.registers[src], count)?;
            }

            Op::NewR { add_ref, dst, count } => {
                self.registers[dst] = self.heap_alloc(count, add_ref);
            }

            Op::NewM { add_ref, dst, count } => {
                let address = self.heap_alloc(count, add_ref);
                self.store_scalar(self.effective(&dst), DataSize::QuadWord, address)?;
            }

            Op::DelR { src } => {
                let payload = Self::heap_payload(self.registers[src])?;
                self.heap.free(payload)?;
            }

            Op::DelM { src } => {
                let address = self.load_scalar(self.effective(&src), DataSize::QuadWord)?;
                let payload = Self::heap_payload(address)?;
                self.heap.free(payload)?;
            }

            Op::MhrR { increase, src } => {
                let payload = Self::heap_payload(self.registers[src])?;
                if increase {
                    self.heap.increase_ref(payload)?;
                } else {
                    self.heap.decrease_ref(payload)?;
                }
            }

            Op::MhrM { increase, src } => {
                let address = self.load_scalar(self.effective(&src), DataSize::QuadWord)?;
                let payload = Self::heap_payload(address)?;
                if increase {
                    self.heap.increase_ref(payload)?;
                } else {
                    self.heap.decrease_ref(payload)?;
                }
            }

            Op::CstR { dst_ty, src_ty, target } => {
                self.registers[target] = data::convert(self.registers[target], src_ty, dst_ty);
            }

            Op::CstM { dst_ty, src_ty, target } => {
                let address = self.effective(&target);
                let bits = self.load_scalar(address, src_ty.size())?;
                let out = data::convert(bits, src_ty, dst_ty);
                self.store_scalar(address, dst_ty.size(), out)?;
            }

            Op::Call { function } => {
                let chunk = self.registers[REG_CH] as ChunkHandle;
                self.call_in_chunk(chunk, function as Word)?;
            }

            Op::Callc { connection, function } => {
                let chunk = self.registers[REG_CH] as ChunkHandle;
                let target = self
                    .program
                    .chunk(chunk)
                    .ok_or(Fault::ChunkNotFound(chunk as Word))?
                    .connection(connection as usize)
                    .ok_or(Fault::ConnectionNotFound(connection as Word))?;
                self.call_in_chunk(target, function as Word)?;
            }

            Op::Ret => return self.return_from_frame(),
        }

        Ok(ExecuteState::Proceed)
    }
}
