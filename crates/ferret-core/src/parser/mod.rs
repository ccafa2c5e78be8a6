//! Parser module for PHP source code
//!
//! Lexes and parses a file into the arena AST consumed by the fact collector
//! and the context classifier. One parse per file; callers hand in bytes or
//! text and get a `ParsedFile` back regardless of syntax errors.

mod ast;
mod grammar;
mod lexer;

pub use ast::{
    Ancestors, AssignOp, Ast, BinaryOp, IncDecOp, Node, NodeId, NodeKind, UnaryOp,
};

use crate::source::SourceIndex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub line_count: usize,
}

#[derive(Debug)]
pub struct ParsedFile {
    metadata: FileMetadata,
    source: String,
    index: SourceIndex,
    ast: Option<Ast>,
    errors: Vec<ParseError>,
}

impl ParsedFile {
    pub fn from_source(filename: &str, source: &str) -> Self {
        let index = SourceIndex::new(source);
        let (ast, errors) = match grammar::parse(source) {
            Ok(ast) => (Some(ast), Vec::new()),
            Err(error) => (None, vec![error]),
        };
        Self {
            metadata: FileMetadata {
                filename: filename.to_string(),
                line_count: index.line_count(),
            },
            source: source.to_string(),
            index,
            ast,
            errors,
        }
    }

    /// Decodes lossily; invalid UTF-8 never fails the analysis.
    pub fn from_bytes(filename: &str, bytes: &[u8]) -> Self {
        let source = String::from_utf8_lossy(bytes);
        Self::from_source(filename, &source)
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    pub fn ast(&self) -> Option<&Ast> {
        self.ast.as_ref()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn is_ok(&self) -> bool {
        self.ast.is_some()
    }
}
