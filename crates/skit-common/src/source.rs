//! Source file management with a global position space.
//!
//! Each file added to a [`SourceMap`] gets a base offset, so any `BytePos` or
//! `Span` uniquely identifies both the file and the location within it:
//!
//! - File 1: positions `[0, 1000)`
//! - File 2: positions `[1001, 2500)`
//!
//! This means spans never need a file id alongside them.

use std::fmt;
use std::sync::Arc;

use crate::span::{BytePos, Span};

/// A unique identifier for a source file within a `SourceMap`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u32);

impl FileId {
    /// Creates a new file ID.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// Line and column information for a position in a source file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LineCol {
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number (in UTF-8 bytes).
    pub column: u32,
}

impl LineCol {
    /// Creates a new line/column position.
    #[inline]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source file with its content and line table.
#[derive(Clone)]
pub struct SourceFile {
    id: FileId,
    name: Arc<str>,
    source: Arc<str>,
    /// Base offset in global position space.
    base: u32,
    /// Byte offsets of line starts, relative to `base`. First entry is 0.
    line_starts: Vec<u32>,
}

impl SourceFile {
    /// Creates a new source file with a base offset.
    pub fn new(
        id: FileId,
        name: impl Into<Arc<str>>,
        source: impl Into<Arc<str>>,
        base: u32,
    ) -> Self {
        let source = source.into();
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            id,
            name: name.into(),
            source,
            base,
            line_starts,
        }
    }

    /// Returns the file ID.
    #[inline]
    pub const fn id(&self) -> FileId {
        self.id
    }

    /// Returns the file name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source text.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the base offset in global position space.
    #[inline]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Returns the end position (exclusive) in global position space.
    #[inline]
    pub fn end_pos(&self) -> u32 {
        self.base + self.source.len() as u32
    }

    /// Returns true if the given global position is within this file.
    #[inline]
    pub fn contains_pos(&self, pos: BytePos) -> bool {
        let p = pos.to_u32();
        p >= self.base && p < self.end_pos()
    }

    /// Converts a global byte position to a local offset within this file.
    #[inline]
    pub fn local_offset(&self, pos: BytePos) -> u32 {
        pos.to_u32().saturating_sub(self.base)
    }

    /// Converts a global byte position to line/column.
    pub fn line_col(&self, pos: BytePos) -> LineCol {
        let offset = self.local_offset(pos);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let column = offset.saturating_sub(self.line_starts[line]) + 1;
        LineCol {
            line: (line + 1) as u32,
            column,
        }
    }

    /// Returns the source text for a span.
    pub fn span_text(&self, span: Span) -> &str {
        let start = (self.local_offset(span.start) as usize).min(self.source.len());
        let end = (self.local_offset(span.end) as usize).min(self.source.len());
        &self.source[start..end]
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base", &self.base)
            .field("len", &self.source.len())
            .finish()
    }
}

/// The registry of all source files, assigning each a base offset.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
    next_base: u32,
}

impl SourceMap {
    /// Creates a new empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source file to the map and returns its ID.
    pub fn add_file(&mut self, name: impl Into<Arc<str>>, source: impl Into<Arc<str>>) -> FileId {
        let source = source.into();
        let id = FileId::new(self.files.len() as u32);
        let base = self.next_base;
        // Leave a one-byte gap so spans from adjacent files never touch.
        self.next_base = base + source.len() as u32 + 1;
        self.files.push(SourceFile::new(id, name, source, base));
        id
    }

    /// Returns the source file for the given ID.
    pub fn get_file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.as_u32() as usize)
    }

    /// Looks up the file containing the given global position.
    pub fn lookup_file(&self, pos: BytePos) -> Option<&SourceFile> {
        let idx = self.files.partition_point(|f| f.base <= pos.to_u32());
        if idx > 0 {
            let file = &self.files[idx - 1];
            if file.contains_pos(pos) {
                return Some(file);
            }
        }
        None
    }

    /// Looks up the file containing the given span.
    pub fn lookup_span(&self, span: Span) -> Option<&SourceFile> {
        self.lookup_file(span.start)
    }

    /// Returns the number of files in the map.
    #[inline]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns an iterator over all files.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    /// Returns a formatted location string: `filename:line:col`.
    pub fn format_pos(&self, pos: BytePos) -> String {
        if let Some(file) = self.lookup_file(pos) {
            let lc = file.line_col(pos);
            format!("{}:{}:{}", file.name(), lc.line, lc.column)
        } else {
            format!("?:{}", pos.to_u32())
        }
    }
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMap")
            .field("file_count", &self.files.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_positions() {
        let mut map = SourceMap::new();
        let id1 = map.add_file("a.skit", "hello\nworld\n"); // base 0, end 12
        let id2 = map.add_file("b.skit", "content2"); // base 13

        assert_eq!(map.get_file(id1).unwrap().base(), 0);
        assert_eq!(map.get_file(id2).unwrap().base(), 13);
        assert_eq!(map.get_file(id2).unwrap().end_pos(), 21);
    }

    #[test]
    fn test_lookup_file() {
        let mut map = SourceMap::new();
        let id1 = map.add_file("a.skit", "abcde"); // base 0
        let id2 = map.add_file("b.skit", "fghij"); // base 6

        assert_eq!(map.lookup_file(BytePos::new(4)).unwrap().id(), id1);
        assert_eq!(map.lookup_file(BytePos::new(6)).unwrap().id(), id2);
        // Position 5 is in the gap between files.
        assert!(map.lookup_file(BytePos::new(5)).is_none());
    }

    #[test]
    fn test_line_col() {
        let mut map = SourceMap::new();
        let _ = map.add_file("a.skit", "abc\ndef"); // base 0
        let id2 = map.add_file("b.skit", "xyz\n123"); // base 8

        let file2 = map.get_file(id2).unwrap();
        assert_eq!(file2.line_col(BytePos::new(8)), LineCol::new(1, 1));
        assert_eq!(file2.line_col(BytePos::new(12)), LineCol::new(2, 1));
    }

    #[test]
    fn test_format_pos() {
        let mut map = SourceMap::new();
        map.add_file("test.skit", "line1\nline2");
        assert_eq!(map.format_pos(BytePos::new(0)), "test.skit:1:1");
        assert_eq!(map.format_pos(BytePos::new(6)), "test.skit:2:1");
    }

    #[test]
    fn test_span_text() {
        let mut map = SourceMap::new();
        let id = map.add_file("t.skit", "hello world");
        let file = map.get_file(id).unwrap();
        assert_eq!(file.span_text(Span::from_u32(6, 11)), "world");
    }
}
