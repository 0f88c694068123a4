pub mod lexer;
pub mod ast;
pub mod grammar;

use crate::error::ParseError;

pub use ast::ProtoDef;

/// Parse `.proto` schema text into a definition tree.
///
/// This is the main entry point for the parser module. The result is handed
/// to `Builder::import` to materialize it.
pub fn parse(schema_text: &str) -> Result<ProtoDef, ParseError> {
    grammar::parse_schema(schema_text)
}
