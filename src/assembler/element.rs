//! Lexical elements of the assembly surface and their textual forms.

use crate::data::{DataSize, DataType, RegisterId, Word};
use crate::operand::{MemoryLocation, Segment};

use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Source sections.
pub enum Section {
    Static,
    Function,
    Link,
}

impl Section {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Static => ".static",
            Self::Function => ".function",
            Self::Link => ".link",
        }
    }

    /// Lookup by the bare name, without the leading dot.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "static" => Some(Self::Static),
            "function" => Some(Self::Function),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Mnemonics of the assembly surface. `newr` is the reference-assigning
/// allocation; `mhri`/`mhrd` increase and decrease a reference count.
pub enum AsmOpcode {
    Nop,
    Mov,
    Mmb,
    Lea,
    New,
    Newr,
    Del,
    Mhri,
    Mhrd,
    Cast,
}

impl AsmOpcode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Mov => "mov",
            Self::Mmb => "mmb",
            Self::Lea => "lea",
            Self::New => "new",
            Self::Newr => "newr",
            Self::Del => "del",
            Self::Mhri => "mhri",
            Self::Mhrd => "mhrd",
            Self::Cast => "cast",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nop" => Some(Self::Nop),
            "mov" => Some(Self::Mov),
            "mmb" => Some(Self::Mmb),
            "lea" => Some(Self::Lea),
            "new" => Some(Self::New),
            "newr" => Some(Self::Newr),
            "del" => Some(Self::Del),
            "mhri" => Some(Self::Mhri),
            "mhrd" => Some(Self::Mhrd),
            "cast" => Some(Self::Cast),
            _ => None,
        }
    }
}

/// Assembler register names: `r0..r8` plus the role aliases.
pub fn register_name(reg: RegisterId) -> &'static str {
    match reg {
        0 => "r0",
        1 => "r1",
        2 => "r2",
        3 => "r3",
        4 => "r4",
        5 => "r5",
        6 => "r6",
        7 => "r7",
        8 => "r8",
        9 => "sd",
        10 => "sb",
        11 => "sp",
        12 => "sr",
        13 => "ch",
        14 => "st",
        15 => "ip",
        _ => "r?",
    }
}

pub fn register_by_name(name: &str) -> Option<RegisterId> {
    match name {
        "r0" => Some(0),
        "r1" => Some(1),
        "r2" => Some(2),
        "r3" => Some(3),
        "r4" => Some(4),
        "r5" => Some(5),
        "r6" => Some(6),
        "r7" => Some(7),
        "r8" => Some(8),
        "sd" => Some(9),
        "sb" => Some(10),
        "sp" => Some(11),
        "sr" => Some(12),
        "ch" => Some(13),
        "st" => Some(14),
        "ip" => Some(15),
        _ => None,
    }
}

pub fn data_type_name(ty: DataType) -> &'static str {
    match ty {
        DataType::UnsignedByte => "ub",
        DataType::UnsignedWord => "uw",
        DataType::UnsignedDoubleWord => "udw",
        DataType::UnsignedQuadWord => "uqw",
        DataType::SignedByte => "sb",
        DataType::SignedWord => "sw",
        DataType::SignedDoubleWord => "sdw",
        DataType::SignedQuadWord => "sqw",
        DataType::Float => "fd",
        DataType::Double => "dfd",
    }
}

pub fn data_type_by_name(name: &str) -> Option<DataType> {
    match name {
        "ub" => Some(DataType::UnsignedByte),
        "uw" => Some(DataType::UnsignedWord),
        "udw" => Some(DataType::UnsignedDoubleWord),
        "uqw" => Some(DataType::UnsignedQuadWord),
        "sb" => Some(DataType::SignedByte),
        "sw" => Some(DataType::SignedWord),
        "sdw" => Some(DataType::SignedDoubleWord),
        "sqw" => Some(DataType::SignedQuadWord),
        "fd" => Some(DataType::Float),
        "dfd" => Some(DataType::Double),
        _ => None,
    }
}

/// Hex rendering with the trailing `h`; a leading zero keeps numbers whose
/// first digit is a letter from re-lexing as identifiers.
pub fn format_number(value: Word) -> String {
    let hex = format!("{value:x}");
    if hex.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("0{hex}h")
    } else {
        format!("{hex}h")
    }
}

/// String body with the lexer's escapes reapplied.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || (c as u32) == 0x7f => {
                out.push_str(&format!("\\a{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Source form of a memory location.
pub fn memory_location_string(loc: &MemoryLocation) -> String {
    let mut out = String::new();

    match loc.segment {
        Segment::None => out.push('['),
        Segment::Stack => out.push_str("$["),
        Segment::Static => out.push_str("%["),
        Segment::Register(reg) => {
            out.push_str(register_name(reg));
            out.push('[');
        }
    }

    if let Some(split) = loc.split {
        out.push_str(register_name(split.reg));
        match split.scale {
            DataSize::Byte => {}
            DataSize::Word => out.push_str("*2"),
            DataSize::DoubleWord => out.push_str("*4"),
            DataSize::QuadWord => out.push_str("*8"),
        }
    }

    if loc.delta != 0 {
        out.push('+');
        out.push_str(&format_number(loc.delta));
    }
    out.push(']');

    out
}

#[derive(Debug, Clone, PartialEq)]
/// One lexical element of a source line.
pub enum Element {
    Token(String),
    Comma,
    End,
    Section(Section),
    Opcode(AsmOpcode),
    Tag(String),
    TagEnd,
    DataType(DataType),
    Str(String),
    Number(Word),
    Register(RegisterId),
    StackSegment,
    StaticSegment,
    SplitIndicator,
    DeltaSeparator,
    MemoryLocation(MemoryLocation),
    MemoryLocationBegin,
    MemoryLocationEnd,
}

impl Element {
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    pub const fn is_token(&self) -> bool {
        matches!(self, Self::Token(_))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => f.write_str(token),
            Self::Comma => f.write_str(","),
            Self::End => f.write_str(";"),
            Self::Section(section) => f.write_str(section.name()),
            Self::Opcode(opcode) => f.write_str(opcode.name()),
            Self::Tag(tag) => write!(f, "{tag}:"),
            Self::TagEnd => f.write_str(":"),
            Self::DataType(ty) => f.write_str(data_type_name(*ty)),
            Self::Str(value) => write!(f, "\"{}\"", escape_string(value)),
            Self::Number(value) => f.write_str(&format_number(*value)),
            Self::Register(reg) => f.write_str(register_name(*reg)),
            Self::StackSegment => f.write_str("$"),
            Self::StaticSegment => f.write_str("%"),
            Self::SplitIndicator => f.write_str("*"),
            Self::DeltaSeparator => f.write_str("+"),
            Self::MemoryLocation(loc) => f.write_str(&memory_location_string(loc)),
            Self::MemoryLocationBegin => f.write_str("["),
            Self::MemoryLocationEnd => f.write_str("]"),
        }
    }
}

/// Render a parsed line back to source, elements separated by one space.
pub fn render_line(elements: &[Element]) -> String {
    elements.iter().map(Element::to_string).join(" ")
}
