//! Lexing and parsing of the C subset. The frontend produces a plain syntax
//! tree; nothing here knows about scopes or types.

use std::path::PathBuf;

use self::{ast::Program, lexer::Span, parser::Parser};
use crate::error::Diagnostic;

pub mod ast;
pub mod intern;
pub mod lexer;
pub mod parser;

/// Declarations made available to every program. Calls to these lower to
/// system calls unless the program defines them itself.
pub const PRELUDE: &str = "void print(int value);\nvoid putchar(int c);\n";

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn prelude() -> Self {
        Self {
            contents: PRELUDE.to_owned(),
            origin: SourceFileOrigin::Prelude,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    Prelude,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::Prelude => f.write_str("<prelude>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

/// A 1-based line and column in a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Parses the prelude followed by `source` into a single program. Node ids
/// are unique across both.
pub fn parse_program(source: &SourceFile) -> Result<Program, Diagnostic> {
    let prelude = SourceFile::prelude();

    let mut parser = Parser::new(&prelude, 0);
    let mut items = parser.parse_items()?;

    let mut parser = Parser::new(source, parser.next_node_id());
    items.extend(parser.parse_items()?);

    log::debug!("parsed {} top level items from {}", items.len(), source.origin);

    Ok(Program { items })
}
