//! Lexer for the assembly surface: bytes to [`Element`]s.
//!
//! A parse error poisons only its line; [`parse_source`] records the
//! diagnostic, skips to the next line and keeps going.

use super::element::{
    data_type_by_name, register_by_name, AsmOpcode, Element, Section,
};
use super::reader::SourceReader;
use crate::data::{DataSize, Word};
use crate::error::{CompilerError, CompilerErrors};
use crate::operand::{MemoryLocation, Segment, Split};

fn error(reader: &SourceReader, message: impl Into<String>) -> CompilerError {
    let (row, column) = reader.position();
    CompilerError::with_position(message, row, column)
}

/// Numbers are hex digits with a trailing `h`.
fn parse_number(token: &str) -> Option<Word> {
    let digits = token.strip_suffix('h')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Word::from_str_radix(digits, 16).ok()
}

/// Keyword precedence: opcodes, then registers, then data types, then
/// numbers. `sb` therefore always lexes as the register; type positions
/// re-read it.
fn decode_token(token: &str) -> Element {
    if let Some(opcode) = AsmOpcode::from_name(token) {
        return Element::Opcode(opcode);
    }
    if let Some(reg) = register_by_name(token) {
        return Element::Register(reg);
    }
    if let Some(ty) = data_type_by_name(token) {
        return Element::DataType(ty);
    }
    if let Some(value) = parse_number(token) {
        return Element::Number(value);
    }
    Element::Token(token.to_string())
}

fn flush(reader: &mut SourceReader, buffer: &str) -> Option<Element> {
    if buffer.is_empty() {
        None
    } else {
        reader.prev();
        Some(decode_token(buffer))
    }
}

fn read_section(reader: &mut SourceReader) -> Result<Section, CompilerError> {
    match parse_element(reader)? {
        Element::Token(name) => {
            Section::from_name(&name).ok_or_else(|| error(reader, format!("Invalid section: .{name}.")))
        }
        other => Err(error(reader, format!("Expected section name, found '{other}'."))),
    }
}

fn hex_digit(reader: &SourceReader, byte: u8) -> Result<u8, CompilerError> {
    (byte as char)
        .to_digit(16)
        .map(|digit| digit as u8)
        .ok_or_else(|| error(reader, format!("Invalid hex digit in escape: '{}'.", byte as char)))
}

/// String bodies support C-style escapes plus `\aHH` with two hex digits.
fn read_string(reader: &mut SourceReader, single_quote: bool) -> Result<String, CompilerError> {
    let end = if single_quote { b'\'' } else { b'"' };
    let mut out = String::new();

    while let Some(byte) = reader.next() {
        if byte == end {
            return Ok(out);
        }

        match byte {
            b'\n' => {
                reader.prev();
                return Err(error(reader, "Malformed end of string."));
            }

            b'\\' => {
                let escape = reader
                    .next()
                    .ok_or_else(|| error(reader, "Malformed end of string."))?;
                match escape {
                    b'0' => out.push('\0'),
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    b'r' => out.push('\r'),
                    b'\'' => out.push('\''),
                    b'"' => out.push('"'),
                    b'\\' => out.push('\\'),
                    b'a' => {
                        if !reader.has(2) {
                            return Err(error(reader, "Truncated \\a escape in string."));
                        }
                        let high = reader.next().unwrap_or(0);
                        let low = reader.next().unwrap_or(0);
                        let high = hex_digit(reader, high)?;
                        let low = hex_digit(reader, low)?;
                        out.push(((high << 4) | low) as char);
                    }
                    other => {
                        return Err(error(
                            reader,
                            format!("Invalid escape in string: '\\{}'.", other as char),
                        ))
                    }
                }
            }

            other => out.push(other as char),
        }
    }

    Err(error(reader, "Malformed end of string."))
}

fn expect_number(reader: &mut SourceReader) -> Result<Word, CompilerError> {
    match parse_element(reader)? {
        Element::Number(value) => Ok(value),
        other => Err(error(reader, format!("Expected number, found '{other}'."))),
    }
}

/// Body of a memory location, after the opening bracket:
/// `reg (*scale)?` then any number of `+number` deltas, then `]`.
fn parse_memory_location(
    reader: &mut SourceReader,
    segment: Segment,
) -> Result<MemoryLocation, CompilerError> {
    let mut loc = MemoryLocation {
        segment,
        split: None,
        delta: 0,
    };
    let mut seen_delta = false;
    let mut pending: Option<Element> = None;

    loop {
        let element = match pending.take() {
            Some(element) => element,
            None => parse_element(reader)?,
        };

        match element {
            Element::MemoryLocationEnd => break,

            Element::Register(reg) => {
                if loc.split.is_some() {
                    return Err(error(reader, "Only one split part is allowed in a memory location."));
                }
                if seen_delta {
                    return Err(error(reader, "Split must precede the delta in a memory location."));
                }

                let follow = parse_element(reader)?;
                if matches!(follow, Element::SplitIndicator) {
                    let scale = match expect_number(reader)? {
                        1 => DataSize::Byte,
                        2 => DataSize::Word,
                        4 => DataSize::DoubleWord,
                        8 => DataSize::QuadWord,
                        _ => {
                            return Err(error(reader, "Split is only valid in 1, 2, 4 or 8 byte blocks."))
                        }
                    };
                    loc.split = Some(Split::new(reg, scale));
                } else {
                    loc.split = Some(Split::new(reg, DataSize::Byte));
                    pending = Some(follow);
                }
            }

            Element::DeltaSeparator => {
                seen_delta = true;
                loc.delta = loc.delta.wrapping_add(expect_number(reader)?);
            }

            Element::Number(value) => {
                if seen_delta || loc.split.is_some() {
                    return Err(error(reader, "Invalid position for delta displacement in memory location."));
                }
                seen_delta = true;
                loc.delta = loc.delta.wrapping_add(value);
            }

            Element::End => {
                // report the failing line, not the one after the newline
                reader.prev();
                return Err(error(reader, "Unterminated memory location."));
            }

            other => {
                return Err(error(
                    reader,
                    format!("Unexpected element '{other}' in memory location."),
                ))
            }
        }
    }

    Ok(loc)
}

/// `$` and `%` open a memory location when a bracket follows, and stand
/// alone as segment elements otherwise.
fn segment_or_location(
    reader: &mut SourceReader,
    segment: Segment,
) -> Result<Element, CompilerError> {
    if reader.peek() == Some(b'[') {
        reader.next();
        return parse_memory_location(reader, segment).map(Element::MemoryLocation);
    }

    Ok(match segment {
        Segment::Static => Element::StaticSegment,
        _ => Element::StackSegment,
    })
}

/// Lex one element. `;` comments to the end of the line; a newline, a
/// comment or the end of input yields [`Element::End`].
pub fn parse_element(reader: &mut SourceReader) -> Result<Element, CompilerError> {
    let mut buffer = String::new();

    while let Some(byte) = reader.next() {
        match byte {
            b'\n' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::End);
            }

            b';' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                reader.skip_line();
                return Ok(Element::End);
            }

            b',' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::Comma);
            }

            b'*' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::SplitIndicator);
            }

            b'+' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::DeltaSeparator);
            }

            b':' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::TagEnd);
            }

            b'[' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return parse_memory_location(reader, Segment::None).map(Element::MemoryLocation);
            }

            b']' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return Ok(Element::MemoryLocationEnd);
            }

            b'\r' => {}

            b' ' | b'\t' => {
                if !buffer.is_empty() {
                    return Ok(decode_token(&buffer));
                }
            }

            b'.' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return read_section(reader).map(Element::Section);
            }

            b'\'' | b'"' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return read_string(reader, byte == b'\'').map(Element::Str);
            }

            b'$' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return segment_or_location(reader, Segment::Stack);
            }

            b'%' => {
                if let Some(element) = flush(reader, &buffer) {
                    return Ok(element);
                }
                return segment_or_location(reader, Segment::Static);
            }

            other => buffer.push(other as char),
        }
    }

    if buffer.is_empty() {
        Ok(Element::End)
    } else {
        Ok(decode_token(&buffer))
    }
}

/// Lex elements up to the end of the line, folding `ident :` into a tag.
pub fn parse_line(reader: &mut SourceReader) -> Result<Vec<Element>, CompilerError> {
    let mut elements: Vec<Element> = Vec::new();

    while !reader.eof() {
        let element = parse_element(reader)?;
        if element.is_end() {
            break;
        }

        if matches!(element, Element::TagEnd) && elements.last().is_some_and(Element::is_token) {
            if let Some(Element::Token(name)) = elements.pop() {
                elements.push(Element::Tag(name));
            }
            continue;
        }

        elements.push(element);
    }

    Ok(elements)
}

#[derive(Debug, Clone, PartialEq)]
/// One successfully lexed source line.
pub struct Line {
    pub row: usize,
    pub elements: Vec<Element>,
}

/// Lex a whole source text. Lines with errors are recorded and skipped;
/// parsing never aborts early.
pub fn parse_source(text: &str) -> (Vec<Line>, CompilerErrors) {
    let mut reader = SourceReader::new(text);
    let mut lines = Vec::new();
    let mut errors = CompilerErrors::new();

    while !reader.eof() {
        let row = reader.row();
        match parse_line(&mut reader) {
            Ok(elements) => {
                if !elements.is_empty() {
                    lines.push(Line { row, elements });
                }
            }
            Err(diagnostic) => {
                errors.push(diagnostic);
                // recover at the next line unless the failure already
                // consumed its newline
                if reader.column() > 1 {
                    reader.skip_line();
                }
            }
        }
    }

    (lines, errors)
}
