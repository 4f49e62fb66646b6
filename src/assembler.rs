//! Assembler front end surface: lexing to elements, diagnostics with
//! source positions, and lowering of instruction lines through the
//! encoder. Section and tag bookkeeping beyond this surface belongs to
//! the outer assembler driver.

mod element;
mod emit;
mod parser;
mod reader;

pub use element::{
    data_type_by_name, data_type_name, escape_string, format_number, memory_location_string,
    register_by_name, register_name, render_line, AsmOpcode, Element, Section,
};
pub use emit::{assemble, assemble_line};
pub use parser::{parse_element, parse_line, parse_source, Line};
pub use reader::SourceReader;
