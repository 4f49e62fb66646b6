//! VM parameters

use crate::data::{RegisterId, Word};

use std::mem;

/* REGISTER FILE */

/// Register count for the register file and the saved frame image.
pub const VM_REGISTER_COUNT: usize = 16;

/// Static-data base of the current chunk, alias of `r9`.
pub const REG_SD: RegisterId = 0x09;

/// Stack-base offset of the current frame, alias of `r10`.
pub const REG_SB: RegisterId = 0x0a;

/// Offset of the start of the current parameter area, alias of `r11`.
pub const REG_SP: RegisterId = 0x0b;

/// Return-value slot, alias of `r12`. Survives a return.
pub const REG_SR: RegisterId = 0x0c;

/// Current chunk handle, alias of `r13`.
pub const REG_CH: RegisterId = 0x0d;

/// Stack top offset, alias of `r14`.
pub const REG_ST: RegisterId = 0x0e;

/// Instruction pointer into the current code region, alias of `r15`.
pub const REG_IP: RegisterId = 0x0f;

/* MEMORY MODEL */

/// Length of a word, in bytes.
pub const WORD_SIZE: usize = mem::size_of::<Word>();

/// Bytes of one saved register image on the stack.
pub const REGISTER_IMAGE_SIZE: usize = VM_REGISTER_COUNT * WORD_SIZE;

/// Shift of the region tag inside a VM address. The low 48 bits are the
/// offset within the region.
pub const REGION_SHIFT: u32 = 48;

/// Mask selecting the offset bits of a VM address.
pub const REGION_OFFSET_MASK: Word = (1 << REGION_SHIFT) - 1;

/// Region tag of the stack byte region.
pub const REGION_STACK: Word = 0x00;

/// Region tag of the heap arena.
pub const REGION_HEAP: Word = 0x01;

/// First statics region tag; chunk `k` statics live in region `2 + k`.
pub const REGION_STATIC_BASE: Word = 0x02;

/// Bytes of a heap block header: prev, next, size, refs.
pub const HEAP_HEADER_SIZE: usize = 4 * WORD_SIZE;

/* DEFAULT LIMITS */

/// Default stack region size, in bytes.
pub const STACK_DEFAULT_SIZE: usize = 8 * 1024 * 1024;

/// Hard ceiling for stack growth; a resize past it faults.
pub const STACK_LIMIT: usize = 1024 * 1024 * 1024;

/// Default heap arena capacity, in bytes.
pub const HEAP_DEFAULT_CAPACITY: usize = 8 * 1024 * 1024;

/// Maximum simultaneously active call frames.
pub const CALL_STACK_LIMIT: usize = 4096;
