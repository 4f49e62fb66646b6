//! Reference-counted heap.
//!
//! One fixed-capacity arena holds every block as `[header | payload]`. The
//! 32-byte header stores `prev`, `next`, `size` and `refs` little-endian;
//! `prev`/`next` are payload offsets with `0` meaning none, and the list is
//! anchored at the most recently allocated block. Freed ranges go to a
//! first-fit recycle list; the arena is never compacted.
//!
//! The heap belongs to one VM instance and is not thread-safe.

use crate::consts::{HEAP_DEFAULT_CAPACITY, HEAP_HEADER_SIZE, WORD_SIZE};
use crate::data::Word;
use crate::error::Fault;

use tracing::debug;

const PREV_FIELD: usize = 0;
const NEXT_FIELD: usize = WORD_SIZE;
const SIZE_FIELD: usize = 2 * WORD_SIZE;
const REFS_FIELD: usize = 3 * WORD_SIZE;

#[derive(Debug, Clone)]
pub struct Heap {
    arena: Vec<u8>,
    /// Payload offset of the newest block.
    last: Option<usize>,
    /// Bump offset; bytes past it have never been allocated.
    brk: usize,
    /// Recycled `(start, len)` ranges, header included.
    recycled: Vec<(usize, usize)>,
    blocks: usize,
    used: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::with_capacity(HEAP_DEFAULT_CAPACITY)
    }
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: vec![0; capacity],
            last: None,
            brk: 0,
            recycled: Vec::new(),
            blocks: 0,
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// Bytes consumed by live blocks, headers included.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Arena bytes addressable by the VM.
    pub fn bytes(&self) -> &[u8] {
        &self.arena[..self.brk]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.arena[..self.brk]
    }

    fn word_at(&self, offset: usize) -> Word {
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&self.arena[offset..offset + WORD_SIZE]);
        Word::from_le_bytes(raw)
    }

    fn set_word_at(&mut self, offset: usize, value: Word) {
        self.arena[offset..offset + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
    }

    fn header_field(&self, payload: usize, field: usize) -> Word {
        self.word_at(payload - HEAP_HEADER_SIZE + field)
    }

    fn set_header_field(&mut self, payload: usize, field: usize, value: Word) {
        self.set_word_at(payload - HEAP_HEADER_SIZE + field, value);
    }

    fn prev_of(&self, payload: usize) -> Option<usize> {
        match self.header_field(payload, PREV_FIELD) {
            0 => None,
            prev => Some(prev as usize),
        }
    }

    fn next_of(&self, payload: usize) -> Option<usize> {
        match self.header_field(payload, NEXT_FIELD) {
            0 => None,
            next => Some(next as usize),
        }
    }

    /// Payload size of the block at `payload`.
    pub fn size_of(&self, payload: usize) -> Result<usize, Fault> {
        self.check(payload)?;
        Ok(self.header_field(payload, SIZE_FIELD) as usize)
    }

    /// Current reference count of the block at `payload`.
    pub fn refs_of(&self, payload: usize) -> Result<Word, Fault> {
        self.check(payload)?;
        Ok(self.header_field(payload, REFS_FIELD))
    }

    /// Verify that `payload` names a live block.
    fn check(&self, payload: usize) -> Result<(), Fault> {
        let mut cursor = self.last;
        while let Some(current) = cursor {
            if current == payload {
                return Ok(());
            }
            cursor = self.prev_of(current);
        }
        Err(Fault::BadHeapPointer)
    }

    fn carve(&mut self, total: usize) -> Result<usize, Fault> {
        // first fit from the recycle list, splitting any remainder
        for index in 0..self.recycled.len() {
            let (start, len) = self.recycled[index];
            if len >= total {
                if len == total {
                    self.recycled.swap_remove(index);
                } else {
                    self.recycled[index] = (start + total, len - total);
                }
                return Ok(start);
            }
        }

        if self.brk + total > self.arena.len() {
            return Err(Fault::HeapExhausted);
        }

        let start = self.brk;
        self.brk += total;
        Ok(start)
    }

    /// Allocate a block of `size` payload bytes, linked at the tail. The
    /// reference count starts at one when `assign_ref` is set, else zero.
    /// Exhaustion is reported to the caller; zero-size blocks are valid.
    pub fn malloc(&mut self, size: usize, assign_ref: bool) -> Result<usize, Fault> {
        let total = size
            .checked_add(HEAP_HEADER_SIZE)
            .ok_or(Fault::HeapExhausted)?;
        let start = self.carve(total)?;
        let payload = start + HEAP_HEADER_SIZE;

        self.arena[start..start + total].fill(0);
        self.set_header_field(payload, PREV_FIELD, self.last.unwrap_or(0) as Word);
        self.set_header_field(payload, NEXT_FIELD, 0);
        self.set_header_field(payload, SIZE_FIELD, size as Word);
        self.set_header_field(payload, REFS_FIELD, assign_ref as Word);

        if let Some(last) = self.last {
            self.set_header_field(last, NEXT_FIELD, payload as Word);
        }
        self.last = Some(payload);

        self.blocks += 1;
        self.used += total;

        debug!(payload, size, assign_ref, "heap block allocated");

        Ok(payload)
    }

    /// Unlink and recycle the block at `payload`.
    pub fn free(&mut self, payload: usize) -> Result<(), Fault> {
        self.check(payload)?;
        self.free_unchecked(payload);
        Ok(())
    }

    fn free_unchecked(&mut self, payload: usize) {
        let prev = self.prev_of(payload);
        let next = self.next_of(payload);
        let size = self.header_field(payload, SIZE_FIELD) as usize;

        if let Some(prev) = prev {
            self.set_header_field(prev, NEXT_FIELD, next.unwrap_or(0) as Word);
        }
        if let Some(next) = next {
            self.set_header_field(next, PREV_FIELD, prev.unwrap_or(0) as Word);
        }
        if self.last == Some(payload) {
            self.last = prev;
        }

        let total = size + HEAP_HEADER_SIZE;
        self.recycled.push((payload - HEAP_HEADER_SIZE, total));
        self.blocks -= 1;
        self.used -= total;

        debug!(payload, size, "heap block freed");
    }

    /// Bump the reference count, saturating at the maximum.
    pub fn increase_ref(&mut self, payload: usize) -> Result<(), Fault> {
        let refs = self.refs_of(payload)?;
        if refs < Word::MAX {
            self.set_header_field(payload, REFS_FIELD, refs + 1);
        }
        Ok(())
    }

    /// Drop the reference count, clamping at zero.
    pub fn decrease_ref(&mut self, payload: usize) -> Result<(), Fault> {
        let refs = self.refs_of(payload)?;
        if refs > 0 {
            self.set_header_field(payload, REFS_FIELD, refs - 1);
        }
        Ok(())
    }

    /// One linear sweep from the newest block to the oldest, freeing every
    /// block whose reference count is zero. Nothing is moved.
    pub fn garbage_collector(&mut self) {
        let mut swept = 0usize;
        let mut cursor = self.last;
        while let Some(payload) = cursor {
            let prev = self.prev_of(payload);
            if self.header_field(payload, REFS_FIELD) == 0 {
                self.free_unchecked(payload);
                swept += 1;
            }
            cursor = prev;
        }

        debug!(swept, live = self.blocks, "heap sweep finished");
    }
}
