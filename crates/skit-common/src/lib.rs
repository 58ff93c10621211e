//! Shared infrastructure for the Skit compiler.
//!
//! This crate carries everything the front and back ends have in common:
//! byte positions and spans, the source map with its global position space,
//! interned symbols, and the diagnostic types plus their renderer.

pub mod diagnostics;
pub mod source;
pub mod span;
pub mod symbol;

pub use diagnostics::{Diagnostic, DiagnosticEmitter, DiagnosticSink, Label, Severity};
pub use source::{FileId, LineCol, SourceFile, SourceMap};
pub use span::{BytePos, Span};
pub use symbol::{Ident, Symbol, SymbolInterner};
