//! Operand packing and instruction construction.
//!
//! The operand header byte describes the memory-location shape:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0-1  | segment (0 none, 1 stack, 2 static, 3 register) |
//! | 2    | split present |
//! | 3-4  | split scale (×1, ×2, ×4, ×8) |
//! | 5    | delta present |
//! | 6-7  | delta width (byte, word, dword, qword) |
//!
//! A register byte follows with the base register in the low nibble and the
//! split register in the high nibble, then the delta bytes if present.

use crate::bytes::{get_bits, set_bits};
use crate::data::{DataSize, DataType, RegisterId, Word};
use crate::error::Fault;
use crate::instruction::{Instruction, Opcode};
use crate::operand::{MemoryLocation, Segment, Split};

fn field(bit_idx: u32, bit_count: u32, value: u8) -> u8 {
    set_bits(0, bit_idx, bit_count, value as u64) as u8
}

fn reg_pair(low: RegisterId, high: RegisterId) -> u8 {
    field(0, 4, low as u8) | field(4, 4, high as u8)
}

/// Append the encoded form of `loc` to `inst`.
pub fn encode_location(inst: &mut Instruction, loc: &MemoryLocation) {
    let delta_size = DataSize::of_value(loc.delta);

    let mut header = field(0, 2, loc.segment.id());
    if let Some(split) = loc.split {
        header |= field(2, 1, 1) | field(3, 2, split.scale as u8);
    }
    if loc.delta != 0 {
        header |= field(5, 1, 1) | field(6, 2, delta_size as u8);
    }

    inst.add_u8(header);
    inst.add_u8(reg_pair(
        loc.segment.base_register(),
        loc.split.map(|split| split.reg).unwrap_or(0),
    ));

    if loc.delta != 0 {
        inst.add_scalar(delta_size, loc.delta);
    }
}

/// Byte cursor over encoded code, shared by the instruction parser and the
/// execution engine's operand decoding.
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn take_u8(&mut self) -> Result<u8, Fault> {
        let byte = *self.bytes.get(self.pos).ok_or(Fault::TruncatedOperand)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn take_scalar(&mut self, size: DataSize) -> Result<Word, Fault> {
        let raw = self
            .bytes
            .get(self.pos..)
            .and_then(|rest| crate::bytes::read_scalar_le(rest, size))
            .ok_or(Fault::TruncatedOperand)?;
        self.pos += size.bytes();
        Ok(raw)
    }

    pub fn take_u16(&mut self) -> Result<u16, Fault> {
        Ok(self.take_scalar(DataSize::Word)? as u16)
    }

    /// Inverse of [`encode_location`].
    pub fn take_location(&mut self) -> Result<MemoryLocation, Fault> {
        let header = self.take_u8()? as u64;
        let regs = self.take_u8()?;

        let segment = match get_bits(header, 0, 2) {
            1 => Segment::Stack,
            2 => Segment::Static,
            3 => Segment::Register((regs & 0x0f) as RegisterId),
            _ => Segment::None,
        };

        let split = if get_bits(header, 2, 1) != 0 {
            let scale = DataSize::from_u8(get_bits(header, 3, 2) as u8).ok_or(Fault::TruncatedOperand)?;
            Some(Split::new((regs >> 4) as RegisterId, scale))
        } else {
            None
        };

        let delta = if get_bits(header, 5, 1) != 0 {
            let width = DataSize::from_u8(get_bits(header, 6, 2) as u8).ok_or(Fault::TruncatedOperand)?;
            self.take_scalar(width)?
        } else {
            0
        };

        Ok(MemoryLocation {
            segment,
            split,
            delta,
        })
    }
}

/* INSTRUCTION CONSTRUCTORS */

const fn mov_rr_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovR8R8,
        DataSize::Word => Opcode::MovR16R16,
        DataSize::DoubleWord => Opcode::MovR32R32,
        DataSize::QuadWord => Opcode::MovR64R64,
    }
}

const fn mov_rm_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovR8M8,
        DataSize::Word => Opcode::MovR16M16,
        DataSize::DoubleWord => Opcode::MovR32M32,
        DataSize::QuadWord => Opcode::MovR64M64,
    }
}

const fn mov_ri_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovR8Imm8,
        DataSize::Word => Opcode::MovR16Imm16,
        DataSize::DoubleWord => Opcode::MovR32Imm32,
        DataSize::QuadWord => Opcode::MovR64Imm64,
    }
}

const fn mov_mr_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovM8R8,
        DataSize::Word => Opcode::MovM16R16,
        DataSize::DoubleWord => Opcode::MovM32R32,
        DataSize::QuadWord => Opcode::MovM64R64,
    }
}

const fn mov_mi_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovM8Imm8,
        DataSize::Word => Opcode::MovM16Imm16,
        DataSize::DoubleWord => Opcode::MovM32Imm32,
        DataSize::QuadWord => Opcode::MovM64Imm64,
    }
}

const fn mov_mm_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MovM8M8,
        DataSize::Word => Opcode::MovM16M16,
        DataSize::DoubleWord => Opcode::MovM32M32,
        DataSize::QuadWord => Opcode::MovM64M64,
    }
}

const fn mmb_opcode(size: DataSize) -> Opcode {
    match size {
        DataSize::Byte => Opcode::MmbB,
        DataSize::Word => Opcode::MmbW,
        DataSize::DoubleWord => Opcode::MmbD,
        DataSize::QuadWord => Opcode::MmbQ,
    }
}

pub fn nop() -> Instruction {
    Instruction::new(Opcode::Nop)
}

pub fn mov_rr(size: DataSize, dst: RegisterId, src: RegisterId) -> Instruction {
    let mut inst = Instruction::new(mov_rr_opcode(size));
    inst.add_u8(reg_pair(dst, src));
    inst
}

pub fn mov_rm(size: DataSize, dst: RegisterId, src: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(mov_rm_opcode(size));
    inst.add_u8(field(0, 4, dst as u8));
    encode_location(&mut inst, src);
    inst
}

pub fn mov_mr(size: DataSize, dst: &MemoryLocation, src: RegisterId) -> Instruction {
    let mut inst = Instruction::new(mov_mr_opcode(size));
    inst.add_u8(field(0, 4, src as u8));
    encode_location(&mut inst, dst);
    inst
}

/// The immediate is encoded at exactly the opcode's size.
pub fn mov_ri(size: DataSize, dst: RegisterId, value: Word) -> Instruction {
    let mut inst = Instruction::new(mov_ri_opcode(size));
    inst.add_u8(field(0, 4, dst as u8));
    inst.add_scalar(size, value);
    inst
}

pub fn mov_mi(size: DataSize, dst: &MemoryLocation, value: Word) -> Instruction {
    let mut inst = Instruction::new(mov_mi_opcode(size));
    inst.add_scalar(size, value);
    encode_location(&mut inst, dst);
    inst
}

pub fn mov_mm(size: DataSize, dst: &MemoryLocation, src: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(mov_mm_opcode(size));
    encode_location(&mut inst, dst);
    encode_location(&mut inst, src);
    inst
}

pub fn lea(dst: RegisterId, src: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(Opcode::Lea);
    inst.add_u8(field(0, 4, dst as u8));
    encode_location(&mut inst, src);
    inst
}

/// `size` is the width of the `count` operand, not of the copy.
pub fn mmb(size: DataSize, dst: RegisterId, src: RegisterId, count: Word) -> Instruction {
    let mut inst = Instruction::new(mmb_opcode(size));
    inst.add_u8(reg_pair(dst, src));
    inst.add_scalar(size, count);
    inst
}

pub fn new_r(add_ref: bool, dst: RegisterId, count: Word) -> Instruction {
    let width = DataSize::of_value(count);
    let mut inst = Instruction::new(Opcode::NewR);
    inst.add_u8(field(0, 4, dst as u8) | field(4, 2, width as u8) | field(6, 1, add_ref as u8));
    inst.add_scalar(width, count);
    inst
}

pub fn new_m(add_ref: bool, dst: &MemoryLocation, count: Word) -> Instruction {
    let width = DataSize::of_value(count);
    let mut inst = Instruction::new(Opcode::NewM);
    inst.add_u8(field(0, 2, width as u8) | field(2, 1, add_ref as u8));
    inst.add_scalar(width, count);
    encode_location(&mut inst, dst);
    inst
}

pub fn del_r(src: RegisterId) -> Instruction {
    let mut inst = Instruction::new(Opcode::DelR);
    inst.add_u8(field(0, 4, src as u8));
    inst
}

pub fn del_m(src: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(Opcode::DelM);
    encode_location(&mut inst, src);
    inst
}

pub fn mhr_r(increase: bool, src: RegisterId) -> Instruction {
    let mut inst = Instruction::new(Opcode::MhrR);
    inst.add_u8(field(0, 4, src as u8) | field(4, 1, increase as u8));
    inst
}

pub fn mhr_m(increase: bool, src: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(Opcode::MhrM);
    inst.add_u8(field(0, 1, increase as u8));
    encode_location(&mut inst, src);
    inst
}

pub fn cst_r(dst_ty: DataType, src_ty: DataType, target: RegisterId) -> Instruction {
    let mut inst = Instruction::new(Opcode::CstR);
    inst.add_u8(field(0, 4, target as u8));
    inst.add_u8(field(0, 4, dst_ty as u8) | field(4, 4, src_ty as u8));
    inst
}

pub fn cst_m(dst_ty: DataType, src_ty: DataType, target: &MemoryLocation) -> Instruction {
    let mut inst = Instruction::new(Opcode::CstM);
    inst.add_u8(field(0, 4, dst_ty as u8) | field(4, 4, src_ty as u8));
    encode_location(&mut inst, target);
    inst
}

pub fn call(function: u16) -> Instruction {
    let mut inst = Instruction::new(Opcode::Call);
    inst.add_u16(function);
    inst
}

pub fn callc(connection: u16, function: u16) -> Instruction {
    let mut inst = Instruction::new(Opcode::Callc);
    inst.add_u16(connection);
    inst.add_u16(function);
    inst
}

pub fn ret() -> Instruction {
    Instruction::new(Opcode::Ret)
}

/* DECODING */

#[derive(Debug, Clone, Copy, PartialEq)]
/// An instruction decoded to its operand values.
pub enum Op {
    Nop,
    MovRR { size: DataSize, dst: RegisterId, src: RegisterId },
    MovRM { size: DataSize, dst: RegisterId, src: MemoryLocation },
    MovRI { size: DataSize, dst: RegisterId, imm: Word },
    MovMR { size: DataSize, dst: MemoryLocation, src: RegisterId },
    MovMI { size: DataSize, dst: MemoryLocation, imm: Word },
    MovMM { size: DataSize, dst: MemoryLocation, src: MemoryLocation },
    Lea { dst: RegisterId, src: MemoryLocation },
    Mmb { dst: RegisterId, src: RegisterId, count: Word },
    NewR { add_ref: bool, dst: RegisterId, count: Word },
    NewM { add_ref: bool, dst: MemoryLocation, count: Word },
    DelR { src: RegisterId },
    DelM { src: MemoryLocation },
    MhrR { increase: bool, src: RegisterId },
    MhrM { increase: bool, src: MemoryLocation },
    CstR { dst_ty: DataType, src_ty: DataType, target: RegisterId },
    CstM { dst_ty: DataType, src_ty: DataType, target: MemoryLocation },
    Call { function: u16 },
    Callc { connection: u16, function: u16 },
    Ret,
}

fn data_type(raw: u8) -> Result<DataType, Fault> {
    DataType::from_u8(raw).ok_or(Fault::InvalidDataType(raw))
}

/// MOV opcodes 0x01..=0x18 decompose into a shape row and a size column.
fn mov_shape(raw: u8) -> Option<(u8, DataSize)> {
    if (0x01..=0x18).contains(&raw) {
        let index = raw - 1;
        Some((index / 4, DataSize::from_u8(index % 4)?))
    } else {
        None
    }
}

/// Decode the instruction starting at `bytes[pos]`, returning its operand
/// values and the position of the following instruction.
pub fn decode_op(bytes: &[u8], pos: usize) -> Result<(Op, usize), Fault> {
    let mut cursor = Cursor::new(bytes, pos);
    let raw = cursor.take_u8()?;
    let opcode = Opcode::from_u8(raw).ok_or(Fault::UnknownOpcode(raw))?;

    if let Some((shape, size)) = mov_shape(raw) {
        let op = match shape {
            0 => {
                let regs = cursor.take_u8()?;
                Op::MovRR {
                    size,
                    dst: (regs & 0x0f) as RegisterId,
                    src: (regs >> 4) as RegisterId,
                }
            }
            1 => {
                let dst = (cursor.take_u8()? & 0x0f) as RegisterId;
                let src = cursor.take_location()?;
                Op::MovRM { size, dst, src }
            }
            2 => {
                let dst = (cursor.take_u8()? & 0x0f) as RegisterId;
                let imm = cursor.take_scalar(size)?;
                Op::MovRI { size, dst, imm }
            }
            3 => {
                let src = (cursor.take_u8()? & 0x0f) as RegisterId;
                let dst = cursor.take_location()?;
                Op::MovMR { size, dst, src }
            }
            4 => {
                let imm = cursor.take_scalar(size)?;
                let dst = cursor.take_location()?;
                Op::MovMI { size, dst, imm }
            }
            _ => {
                let dst = cursor.take_location()?;
                let src = cursor.take_location()?;
                Op::MovMM { size, dst, src }
            }
        };
        return Ok((op, cursor.pos()));
    }

    let op = match opcode {
        Opcode::Nop => Op::Nop,
        Opcode::Ret => Op::Ret,

        Opcode::Lea => {
            let dst = (cursor.take_u8()? & 0x0f) as RegisterId;
            let src = cursor.take_location()?;
            Op::Lea { dst, src }
        }

        Opcode::MmbB | Opcode::MmbW | Opcode::MmbD | Opcode::MmbQ => {
            let size = DataSize::from_u8(raw - Opcode::MmbB.as_u8()).ok_or(Fault::UnknownOpcode(raw))?;
            let regs = cursor.take_u8()?;
            let count = cursor.take_scalar(size)?;
            Op::Mmb {
                dst: (regs & 0x0f) as RegisterId,
                src: (regs >> 4) as RegisterId,
                count,
            }
        }

        Opcode::NewR => {
            let packed = cursor.take_u8()? as u64;
            let width = DataSize::from_u8(get_bits(packed, 4, 2) as u8).ok_or(Fault::TruncatedOperand)?;
            let count = cursor.take_scalar(width)?;
            Op::NewR {
                add_ref: get_bits(packed, 6, 1) != 0,
                dst: get_bits(packed, 0, 4) as RegisterId,
                count,
            }
        }

        Opcode::NewM => {
            let packed = cursor.take_u8()? as u64;
            let width = DataSize::from_u8(get_bits(packed, 0, 2) as u8).ok_or(Fault::TruncatedOperand)?;
            let count = cursor.take_scalar(width)?;
            let dst = cursor.take_location()?;
            Op::NewM {
                add_ref: get_bits(packed, 2, 1) != 0,
                dst,
                count,
            }
        }

        Opcode::DelR => Op::DelR {
            src: (cursor.take_u8()? & 0x0f) as RegisterId,
        },

        Opcode::DelM => Op::DelM {
            src: cursor.take_location()?,
        },

        Opcode::MhrR => {
            let packed = cursor.take_u8()? as u64;
            Op::MhrR {
                increase: get_bits(packed, 4, 1) != 0,
                src: get_bits(packed, 0, 4) as RegisterId,
            }
        }

        Opcode::MhrM => {
            let packed = cursor.take_u8()? as u64;
            Op::MhrM {
                increase: get_bits(packed, 0, 1) != 0,
                src: cursor.take_location()?,
            }
        }

        Opcode::CstR => {
            let target = (cursor.take_u8()? & 0x0f) as RegisterId;
            let types = cursor.take_u8()?;
            Op::CstR {
                dst_ty: data_type(types & 0x0f)?,
                src_ty: data_type(types >> 4)?,
                target,
            }
        }

        Opcode::CstM => {
            let types = cursor.take_u8()?;
            Op::CstM {
                dst_ty: data_type(types & 0x0f)?,
                src_ty: data_type(types >> 4)?,
                target: cursor.take_location()?,
            }
        }

        Opcode::Call => Op::Call {
            function: cursor.take_u16()?,
        },

        Opcode::Callc => Op::Callc {
            connection: cursor.take_u16()?,
            function: cursor.take_u16()?,
        },

        // MOV opcodes were handled above
        _ => return Err(Fault::UnknownOpcode(raw)),
    };

    Ok((op, cursor.pos()))
}

/// Decode one instruction from the start of `bytes` into its raw record
/// form, returning it with its encoded length.
pub fn decode_instruction(bytes: &[u8]) -> Result<(Instruction, usize), Fault> {
    let (_, len) = decode_op(bytes, 0)?;
    let raw = bytes[0];
    let opcode = Opcode::from_u8(raw).ok_or(Fault::UnknownOpcode(raw))?;

    Ok((Instruction::with_args(opcode, bytes[1..len].to_vec()), len))
}
