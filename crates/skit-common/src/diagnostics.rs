//! Diagnostic reporting.
//!
//! Every compiler message is a [`Diagnostic`] with a severity, a main text
//! and span-tagged labels, collected in a [`DiagnosticSink`] and rendered by
//! [`DiagnosticEmitter`] through `codespan-reporting`.
//!
//! Spans live in the global position space, so a label needs no file id.

use std::fmt;

use codespan_reporting::diagnostic::{
    Diagnostic as CSDiagnostic, Label as CSLabel, LabelStyle, Severity as CSSeverity,
};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{
    self,
    termcolor::{ColorChoice, StandardStream, WriteColor},
    Config,
};

use crate::source::SourceMap;
use crate::span::Span;

/// Severity level of a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Severity {
    /// A fatal error that prevents code generation.
    Error,
    /// A warning; never blocks code generation.
    Warning,
    /// Verbose compiler chatter, developer-facing.
    Note,
    /// A suggestion attached to another diagnostic.
    Help,
}

impl Severity {
    /// Returns true if this is an error.
    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }

    /// Returns true if this is a warning.
    #[inline]
    pub const fn is_warning(self) -> bool {
        matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

impl From<Severity> for CSSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => CSSeverity::Error,
            Severity::Warning => CSSeverity::Warning,
            Severity::Note => CSSeverity::Note,
            Severity::Help => CSSeverity::Help,
        }
    }
}

/// A label pointing at a source location.
#[derive(Clone, Debug)]
pub struct Label {
    /// Primary or secondary.
    pub style: LabelStyle,
    /// The span this label points to (global position).
    pub span: Span,
    /// An optional message for this label.
    pub message: Option<String>,
}

impl Label {
    /// Creates a primary label (the main location of the diagnostic).
    pub fn primary(span: impl Into<Span>) -> Self {
        Self {
            style: LabelStyle::Primary,
            span: span.into(),
            message: None,
        }
    }

    /// Creates a secondary label (additional context).
    pub fn secondary(span: impl Into<Span>) -> Self {
        Self {
            style: LabelStyle::Secondary,
            span: span.into(),
            message: None,
        }
    }

    /// Adds a message to this label.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A diagnostic message with severity, location and optional notes.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// The severity of this diagnostic.
    pub severity: Severity,
    /// The main message.
    pub message: String,
    /// Labels pointing to relevant source locations.
    pub labels: Vec<Label>,
    /// Additional notes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new diagnostic with the given severity and message.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Creates an error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Creates a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Creates a note diagnostic.
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    /// Adds a label to this diagnostic.
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Returns true if this is an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

/// A collector for diagnostics during compilation.
#[derive(Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticSink {
    /// Creates a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic to the sink.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    /// Emits an error with a primary label at `span`.
    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::error(message).with_label(Label::primary(span)));
    }

    /// Emits a warning with a primary label at `span`.
    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::warning(message).with_label(Label::primary(span)));
    }

    /// Emits a note with a primary label at `span`.
    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::note(message).with_label(Label::primary(span)));
    }

    /// Returns the number of errors.
    #[inline]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Returns the number of warnings.
    #[inline]
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Returns true if any errors were emitted.
    #[inline]
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Returns true if no diagnostics were emitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[inline]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns an iterator over all diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns all diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Takes all diagnostics, leaving the sink empty.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        self.warning_count = 0;
        std::mem::take(&mut self.diagnostics)
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("errors", &self.error_count)
            .field("warnings", &self.warning_count)
            .field("total", &self.diagnostics.len())
            .finish()
    }
}

/// Renders diagnostics against a source map.
pub struct DiagnosticEmitter<'a> {
    source_map: &'a SourceMap,
    config: Config,
}

impl<'a> DiagnosticEmitter<'a> {
    /// Creates a new diagnostic emitter.
    pub fn new(source_map: &'a SourceMap) -> Self {
        Self {
            source_map,
            config: Config::default(),
        }
    }

    /// Emits a diagnostic to stderr with colors.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        self.emit_to(&mut writer.lock(), diagnostic);
    }

    /// Emits a diagnostic to a writer.
    pub fn emit_to<W: WriteColor>(&self, writer: &mut W, diagnostic: &Diagnostic) {
        let files = self.build_files();
        let cs = self.to_codespan(diagnostic);
        let _ = term::emit(writer, &self.config, &files, &cs);
    }

    /// Emits a diagnostic to a string (no colors).
    pub fn emit_to_string(&self, diagnostic: &Diagnostic) -> String {
        let mut buffer = termcolor::Buffer::no_color();
        self.emit_to(&mut buffer, diagnostic);
        String::from_utf8_lossy(buffer.as_slice()).into_owned()
    }

    /// Emits all diagnostics from a sink to stderr.
    pub fn emit_all(&self, sink: &DiagnosticSink) {
        for diagnostic in sink.iter() {
            self.emit(diagnostic);
        }
    }

    fn build_files(&self) -> SimpleFiles<&str, &str> {
        let mut files = SimpleFiles::new();
        for file in self.source_map.files() {
            files.add(file.name(), file.source());
        }
        files
    }

    fn to_codespan(&self, diagnostic: &Diagnostic) -> CSDiagnostic<usize> {
        let mut cs =
            CSDiagnostic::new(diagnostic.severity.into()).with_message(&diagnostic.message);

        let labels: Vec<CSLabel<usize>> = diagnostic
            .labels
            .iter()
            .filter_map(|label| {
                let file = self.source_map.lookup_span(label.span)?;
                let start = file.local_offset(label.span.start) as usize;
                let end = file.local_offset(label.span.end) as usize;
                let mut cs_label =
                    CSLabel::new(label.style, file.id().as_u32() as usize, start..end);
                if let Some(msg) = &label.message {
                    cs_label = cs_label.with_message(msg);
                }
                Some(cs_label)
            })
            .collect();

        cs.with_labels(labels).with_notes(diagnostic.notes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_counts() {
        let mut sink = DiagnosticSink::new();
        assert!(sink.is_empty());

        sink.error(Span::from_u32(0, 1), "error 1");
        sink.warning(Span::from_u32(1, 2), "warning 1");
        sink.error(Span::from_u32(2, 3), "error 2");

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn test_notes_do_not_count_as_errors() {
        let mut sink = DiagnosticSink::new();
        sink.note(Span::dummy(), "just chatter");
        assert!(!sink.has_errors());
        assert_eq!(sink.warning_count(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_take_resets() {
        let mut sink = DiagnosticSink::new();
        sink.error(Span::dummy(), "e");
        let diags = sink.take();
        assert_eq!(diags.len(), 1);
        assert!(sink.is_empty());
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn test_emitter_renders_message() {
        let mut map = SourceMap::new();
        map.add_file("test.skit", "int x = \"oops\";");

        let emitter = DiagnosticEmitter::new(&map);
        let diag = Diagnostic::error("cannot convert String to Int")
            .with_label(Label::primary(8u32..14u32).with_message("this value"));
        let out = emitter.emit_to_string(&diag);

        assert!(out.contains("error"));
        assert!(out.contains("cannot convert String to Int"));
    }
}
