//! Ferret Core - Static analysis engine for PHP output-escaping hygiene
//!
//! This crate provides the core analysis functionality including:
//! - A lexer/parser for the PHP subset the analysis understands
//! - AST fact collection (variable shapes, calls, usages)
//! - Use-site context classification (HTML output vs database binding)
//! - Taint and shape state tracking per file
//! - A line-level autofix rewriter wrapping references in `htmlspecialchars`
//! - Finding aggregation: at most one finding per source line
//!
//! The engine is file-oriented and synchronous: callers hand in bytes or
//! text one file at a time and receive an ordered list of findings.

pub mod analysis;
pub mod config;
pub mod context;
pub mod facts;
pub mod finding;
pub mod fix;
pub mod parser;
pub mod source;
pub mod taint;

pub use analysis::AnalysisEngine;
pub use config::Config;
pub use finding::{Finding, FindingKind, PREPARED_STATEMENT_FIX};
pub use parser::ParsedFile;
