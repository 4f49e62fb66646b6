//! VM address resolution and typed memory access.
//!
//! A VM address carries a region tag in its high 16 bits and an offset in
//! the low 48: region 0 is the stack byte region (so stack addresses are
//! plain offsets and survive a stack resize), region 1 is the heap arena,
//! and region `2 + k` is the statics region of chunk `k`.

use super::Interpreter;
use crate::bytes;
use crate::chunk::ChunkHandle;
use crate::consts::{REGION_HEAP, REGION_OFFSET_MASK, REGION_SHIFT, REGION_STATIC_BASE, REG_CH, REG_SB};
use crate::data::{DataSize, Word};
use crate::error::Fault;
use crate::operand::{MemoryLocation, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Stack,
    Heap,
    Static(ChunkHandle),
}

fn split_address(addr: Word) -> (Region, usize) {
    let offset = (addr & REGION_OFFSET_MASK) as usize;
    let region = match addr >> REGION_SHIFT {
        0 => Region::Stack,
        1 => Region::Heap,
        tag => Region::Static((tag - REGION_STATIC_BASE) as ChunkHandle),
    };
    (region, offset)
}

impl Interpreter {
    /// Base address of the statics region of `chunk`.
    pub fn statics_base(&self, chunk: ChunkHandle) -> Word {
        (REGION_STATIC_BASE + chunk as Word) << REGION_SHIFT
    }

    /// Address of the heap block payload at `payload` offset.
    pub fn heap_address(&self, payload: usize) -> Word {
        (REGION_HEAP << REGION_SHIFT) | payload as Word
    }

    /// Payload offset of a heap address; non-heap addresses do not name
    /// heap blocks.
    pub(crate) fn heap_payload(addr: Word) -> Result<usize, Fault> {
        match split_address(addr) {
            (Region::Heap, offset) => Ok(offset),
            _ => Err(Fault::BadHeapPointer),
        }
    }

    /// Effective address of a memory location:
    /// `base(segment) + split.reg * scale + delta`.
    pub(crate) fn effective(&self, loc: &MemoryLocation) -> Word {
        let base = match loc.segment {
            Segment::None => 0,
            Segment::Stack => self.registers[REG_SB],
            Segment::Static => self.statics_base(self.registers[REG_CH] as ChunkHandle),
            Segment::Register(reg) => self.registers[reg],
        };

        let split = loc
            .split
            .map(|split| self.registers[split.reg].wrapping_mul(split.factor()))
            .unwrap_or(0);

        base.wrapping_add(split).wrapping_add(loc.delta)
    }

    fn region_bytes(&self, region: Region) -> Result<&[u8], Fault> {
        match region {
            Region::Stack => Ok(self.stack.bytes()),
            Region::Heap => Ok(self.heap.bytes()),
            Region::Static(chunk) => self
                .program
                .chunk(chunk)
                .map(|chunk| chunk.statics())
                .ok_or(Fault::ChunkNotFound(chunk as Word)),
        }
    }

    fn region_bytes_mut(&mut self, region: Region) -> Result<&mut [u8], Fault> {
        match region {
            Region::Stack => Ok(self.stack.bytes_mut()),
            Region::Heap => Ok(self.heap.bytes_mut()),
            Region::Static(chunk) => self
                .program
                .chunk_mut(chunk)
                .map(|chunk| chunk.statics_mut())
                .ok_or(Fault::ChunkNotFound(chunk as Word)),
        }
    }

    /// Borrow `len` bytes at `addr`, bounds-checked against the region.
    pub(crate) fn view(&self, addr: Word, len: usize) -> Result<&[u8], Fault> {
        let (region, offset) = split_address(addr);
        let end = offset.checked_add(len).ok_or(Fault::MemoryOverflow)?;
        self.region_bytes(region)?
            .get(offset..end)
            .ok_or(Fault::MemoryOverflow)
    }

    pub(crate) fn view_mut(&mut self, addr: Word, len: usize) -> Result<&mut [u8], Fault> {
        let (region, offset) = split_address(addr);
        let end = offset.checked_add(len).ok_or(Fault::MemoryOverflow)?;
        self.region_bytes_mut(region)?
            .get_mut(offset..end)
            .ok_or(Fault::MemoryOverflow)
    }

    /// Typed little-endian load of `size` bytes at `addr`.
    pub(crate) fn load_scalar(&self, addr: Word, size: DataSize) -> Result<Word, Fault> {
        bytes::read_scalar_le(self.view(addr, size.bytes())?, size).ok_or(Fault::MemoryOverflow)
    }

    /// Typed little-endian store of the low `size` bytes of `value`.
    pub(crate) fn store_scalar(&mut self, addr: Word, size: DataSize, value: Word) -> Result<(), Fault> {
        bytes::write_scalar_le(self.view_mut(addr, size.bytes())?, size, value).ok_or(Fault::MemoryOverflow)
    }

    /// Copy `len` bytes between two addresses, possibly across regions.
    /// The source is staged, so overlapping ranges are well defined.
    pub(crate) fn copy_block(&mut self, dst: Word, src: Word, len: Word) -> Result<(), Fault> {
        let len = usize::try_from(len).map_err(|_| Fault::MemoryOverflow)?;
        let staged = self.view(src, len)?.to_vec();
        self.view_mut(dst, len)?.copy_from_slice(&staged);
        Ok(())
    }
}
