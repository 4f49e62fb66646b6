//! Lowering of parsed lines to encoded instructions.

use super::element::{data_type_name, Element};
use super::element::AsmOpcode;
use super::parser::parse_source;
use crate::consts::REG_SB;
use crate::data::{DataType, RegisterId, Word};
use crate::encoder;
use crate::error::{CompilerError, CompilerErrors};
use crate::instruction::Instruction;
use crate::operand::{MemoryLocation, Segment};

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Reg(RegisterId),
    Mem(MemoryLocation),
    Imm(Word),
    Type(DataType),
}

impl Operand {
    fn describe(&self) -> String {
        match self {
            Self::Reg(reg) => format!("register {}", super::element::register_name(*reg)),
            Self::Mem(_) => "memory location".to_string(),
            Self::Imm(value) => format!("immediate {value:#x}"),
            Self::Type(ty) => format!("type {}", data_type_name(*ty)),
        }
    }
}

/// One comma-separated operand group.
fn lower_group(group: &[Element]) -> Result<Operand, CompilerError> {
    match group {
        [Element::Register(reg)] => Ok(Operand::Reg(*reg)),
        [Element::Number(value)] => Ok(Operand::Imm(*value)),
        [Element::DataType(ty)] => Ok(Operand::Type(*ty)),
        [Element::MemoryLocation(loc)] => Ok(Operand::Mem(*loc)),
        [Element::StackSegment] => Ok(Operand::Mem(MemoryLocation::stack())),
        [Element::StaticSegment] => Ok(Operand::Mem(MemoryLocation::static_data())),
        // `reg[...]` lexes as a register followed by a baseless location
        [Element::Register(reg), Element::MemoryLocation(loc)]
            if loc.segment == Segment::None =>
        {
            Ok(Operand::Mem(MemoryLocation {
                segment: Segment::Register(*reg),
                ..*loc
            }))
        }
        [] => Err(CompilerError::new("Empty operand.")),
        _ => Err(CompilerError::new("Malformed operand.")),
    }
}

fn lower_operands(elements: &[Element]) -> Result<Vec<Operand>, CompilerError> {
    elements
        .split(|element| matches!(element, Element::Comma))
        .map(lower_group)
        .collect()
}

/// Type position. The `sb` mnemonic lexes as the register alias, so it is
/// re-read as the signed-byte type here.
fn as_type(operand: &Operand) -> Result<DataType, CompilerError> {
    match operand {
        Operand::Type(ty) => Ok(*ty),
        Operand::Reg(REG_SB) => Ok(DataType::SignedByte),
        other => Err(CompilerError::new(format!(
            "Expected data type, found {}.",
            other.describe()
        ))),
    }
}

fn arity_error(opcode: AsmOpcode, expected: &str) -> CompilerError {
    CompilerError::new(format!(
        "Opcode '{}' expects {expected}.",
        opcode.name()
    ))
}

/// Lower one parsed line. Tag and section lines produce no instruction;
/// they belong to the outer assembler driving this surface.
pub fn assemble_line(elements: &[Element]) -> Result<Option<Instruction>, CompilerError> {
    // a leading tag labels the line; the instruction, if any, follows it
    let elements = match elements {
        [Element::Tag(_), rest @ ..] => rest,
        other => other,
    };

    let (opcode, rest) = match elements {
        [] => return Ok(None),
        [Element::Section(_), ..] => return Ok(None),
        [Element::Opcode(opcode), rest @ ..] => (*opcode, rest),
        [other, ..] => {
            return Err(CompilerError::new(format!(
                "Expected opcode at the start of the line, found '{other}'."
            )))
        }
    };

    if matches!(opcode, AsmOpcode::Nop) {
        if !rest.is_empty() {
            return Err(arity_error(opcode, "no operands"));
        }
        return Ok(Some(encoder::nop()));
    }

    let operands = lower_operands(rest)?;

    let instruction = match opcode {
        AsmOpcode::Nop => unreachable!("handled above"),

        AsmOpcode::Mov => match operands.as_slice() {
            [ty, dst, src] => {
                let size = as_type(ty)?.size();
                match (dst, src) {
                    (Operand::Reg(d), Operand::Reg(s)) => encoder::mov_rr(size, *d, *s),
                    (Operand::Reg(d), Operand::Mem(m)) => encoder::mov_rm(size, *d, m),
                    (Operand::Reg(d), Operand::Imm(v)) => encoder::mov_ri(size, *d, *v),
                    (Operand::Mem(m), Operand::Reg(s)) => encoder::mov_mr(size, m, *s),
                    (Operand::Mem(m), Operand::Imm(v)) => encoder::mov_mi(size, m, *v),
                    (Operand::Mem(d), Operand::Mem(s)) => encoder::mov_mm(size, d, s),
                    (dst, src) => {
                        return Err(CompilerError::new(format!(
                            "Invalid mov operands: {} and {}.",
                            dst.describe(),
                            src.describe()
                        )))
                    }
                }
            }
            _ => return Err(arity_error(opcode, "a type, a destination and a source")),
        },

        AsmOpcode::Mmb => match operands.as_slice() {
            [ty, Operand::Reg(dst), Operand::Reg(src), Operand::Imm(count)] => {
                encoder::mmb(as_type(ty)?.size(), *dst, *src, *count)
            }
            _ => return Err(arity_error(opcode, "a type, two registers and a byte count")),
        },

        AsmOpcode::Lea => match operands.as_slice() {
            [Operand::Reg(dst), Operand::Mem(src)] => encoder::lea(*dst, src),
            _ => return Err(arity_error(opcode, "a register and a memory location")),
        },

        AsmOpcode::New | AsmOpcode::Newr => {
            let add_ref = matches!(opcode, AsmOpcode::Newr);
            match operands.as_slice() {
                [Operand::Reg(dst), Operand::Imm(count)] => encoder::new_r(add_ref, *dst, *count),
                [Operand::Mem(dst), Operand::Imm(count)] => encoder::new_m(add_ref, dst, *count),
                _ => return Err(arity_error(opcode, "a destination and a block size")),
            }
        }

        AsmOpcode::Del => match operands.as_slice() {
            [Operand::Reg(src)] => encoder::del_r(*src),
            [Operand::Mem(src)] => encoder::del_m(src),
            _ => return Err(arity_error(opcode, "a register or memory location")),
        },

        AsmOpcode::Mhri | AsmOpcode::Mhrd => {
            let increase = matches!(opcode, AsmOpcode::Mhri);
            match operands.as_slice() {
                [Operand::Reg(src)] => encoder::mhr_r(increase, *src),
                [Operand::Mem(src)] => encoder::mhr_m(increase, src),
                _ => return Err(arity_error(opcode, "a register or memory location")),
            }
        }

        AsmOpcode::Cast => match operands.as_slice() {
            [dst_ty, src_ty, target] => {
                let dst_ty = as_type(dst_ty)?;
                let src_ty = as_type(src_ty)?;
                match target {
                    Operand::Reg(reg) => encoder::cst_r(dst_ty, src_ty, *reg),
                    Operand::Mem(loc) => encoder::cst_m(dst_ty, src_ty, loc),
                    other => {
                        return Err(CompilerError::new(format!(
                            "Invalid cast target: {}.",
                            other.describe()
                        )))
                    }
                }
            }
            _ => return Err(arity_error(opcode, "two types and a target")),
        },
    };

    Ok(Some(instruction))
}

/// Assemble a source text into instructions. Lines with errors are
/// skipped; every diagnostic is collected in order.
pub fn assemble(text: &str) -> (Vec<Instruction>, CompilerErrors) {
    let (lines, mut errors) = parse_source(text);
    let mut instructions = Vec::new();

    for line in lines {
        match assemble_line(&line.elements) {
            Ok(Some(instruction)) => instructions.push(instruction),
            Ok(None) => {}
            Err(diagnostic) => {
                let diagnostic = match diagnostic.position() {
                    Some(_) => diagnostic,
                    None => CompilerError::with_position(diagnostic.message().to_string(), line.row, 1),
                };
                errors.push(diagnostic);
            }
        }
    }

    (instructions, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSize;
    use crate::instruction::Opcode;

    fn assemble_one(text: &str) -> Instruction {
        let (instructions, errors) = assemble(text);
        assert!(!errors.has_errors(), "unexpected errors: {errors}");
        assert_eq!(instructions.len(), 1);
        instructions.into_iter().next().unwrap()
    }

    #[test]
    fn mov_forms_select_their_opcodes() {
        assert_eq!(assemble_one("mov uqw r1, r2").opcode(), Opcode::MovR64R64);
        assert_eq!(assemble_one("mov ub r1, $[+5h]").opcode(), Opcode::MovR8M8);
        assert_eq!(assemble_one("mov udw r1, 12345678h").opcode(), Opcode::MovR32Imm32);
        assert_eq!(assemble_one("mov ub $[+5h], r2").opcode(), Opcode::MovM8R8);
        assert_eq!(assemble_one("mov uw %[], 12h").opcode(), Opcode::MovM16Imm16);
        assert_eq!(assemble_one("mov uqw $[], %[+8h]").opcode(), Opcode::MovM64M64);
    }

    #[test]
    fn immediate_mov_matches_the_reference_bytes() {
        let inst = assemble_one("mov udw r1, 12345678h");
        assert_eq!(inst.to_bytes(), vec![0x0b, 0x01, 0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn register_based_locations_merge() {
        let inst = assemble_one("lea r3, r2[r1*4+10h]");
        let (parsed, _) = crate::encoder::decode_op(&inst.to_bytes(), 0).unwrap();
        match parsed {
            crate::encoder::Op::Lea { dst, src } => {
                assert_eq!(dst, 3);
                assert_eq!(src.segment, Segment::Register(2));
                assert_eq!(src.split.map(|s| (s.reg, s.scale)), Some((1, DataSize::DoubleWord)));
                assert_eq!(src.delta, 0x10);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn heap_mnemonics_lower_to_their_variants() {
        assert_eq!(assemble_one("new r0, 40h").opcode(), Opcode::NewR);
        assert_eq!(assemble_one("newr r0, 40h").opcode(), Opcode::NewR);
        assert_eq!(assemble_one("new %[], 40h").opcode(), Opcode::NewM);
        assert_eq!(assemble_one("del r1").opcode(), Opcode::DelR);
        assert_eq!(assemble_one("mhri r1").opcode(), Opcode::MhrR);
        assert_eq!(assemble_one("mhrd $[+8h]").opcode(), Opcode::MhrM);

        // new vs newr differ in the add_ref bit
        let plain = assemble_one("new r0, 40h");
        let reffed = assemble_one("newr r0, 40h");
        assert_ne!(plain.args()[0], reffed.args()[0]);
    }

    #[test]
    fn cast_accepts_the_sb_collision() {
        let inst = assemble_one("cast sb, uqw, r4");
        let (parsed, _) = crate::encoder::decode_op(&inst.to_bytes(), 0).unwrap();
        assert_eq!(
            parsed,
            crate::encoder::Op::CstR {
                dst_ty: DataType::SignedByte,
                src_ty: DataType::UnsignedQuadWord,
                target: 4,
            }
        );
    }

    #[test]
    fn mmb_uses_the_type_for_the_count_width() {
        let inst = assemble_one("mmb uw r1, r2, 300h");
        assert_eq!(inst.opcode(), Opcode::MmbW);
        assert_eq!(inst.byte_count(), 1 + 1 + 2);
    }

    #[test]
    fn tags_and_sections_emit_nothing() {
        let (instructions, errors) = assemble(".function\nmain:\nnop\n");
        assert!(!errors.has_errors());
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].opcode(), Opcode::Nop);
    }

    #[test]
    fn bad_lines_are_skipped_with_diagnostics() {
        let (instructions, errors) = assemble("nop\nmov r1\nmov uqw r1, r2\nbogus r1\n");
        assert_eq!(instructions.len(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.errors()[0].row(), Some(2));
        assert_eq!(errors.errors()[1].row(), Some(4));
    }
}
