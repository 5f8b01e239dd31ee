//! Go source front end: lexer, AST and recursive-descent parser.
//!
//! Parses the subset of Go this tool consumes — declarations, type
//! expressions, statements and expressions — into plain tree-shaped nodes.
//! Doc comments are attached to declarations and struct fields during
//! parsing, and every declaration records its source line span.

pub mod ast;
mod lexer;
pub mod parser;
mod token;

pub use ast::*;
pub use parser::parse_source;

use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Parses a single Go source file into an AST.
pub fn parse_file(path: &Path) -> Result<GoFile> {
    debug!("Parsing file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| Error::Syntax {
        file: path.to_path_buf(),
        line: 0,
        message: format!("failed to read file: {}", e),
    })?;
    parse_source(&content, path)
}
