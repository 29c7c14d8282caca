//! Source locations for `.fj` forms.
//!
//! The reader gives every form a [`Span`]; lowering copies those spans into
//! its span table so errors raised on IR nodes and variables can point back
//! at the text. Trees built in code carry [`Span::DUMMY`] and are reported
//! without a location.

use serde::{Deserialize, Serialize};

/// Index of a file registered with the [`SourceCache`](crate::SourceCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// File ID of sources read without a cache and of trees built in code.
    pub const DUMMY: FileId = FileId(u32::MAX);
}

/// A byte range in one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// File ID (index into source cache)
    pub file_id: FileId,
    /// Byte offset of start (inclusive)
    pub start: u32,
    /// Byte offset of end (exclusive)
    pub end: u32,
}

impl Span {
    /// Span of something with no source text.
    pub const DUMMY: Span = Span {
        file_id: FileId::DUMMY,
        start: 0,
        end: 0,
    };

    /// Create a new span.
    pub fn new(file_id: FileId, start: u32, end: u32) -> Self {
        Self { file_id, start, end }
    }

    /// Zero-width span at `offset`, e.g. end of input.
    pub fn point(file_id: FileId, offset: u32) -> Self {
        Self::new(file_id, offset, offset)
    }

    /// Check if this span has no source text behind it.
    pub fn is_dummy(&self) -> bool {
        self.file_id == FileId::DUMMY
    }

    /// Smallest span covering both, e.g. a list from its `(` to its `)`.
    /// Both spans must be from the same file.
    pub fn merge(self, other: Span) -> Span {
        debug_assert!(
            self.file_id == other.file_id,
            "cannot merge spans from different files"
        );
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Number of columns to underline: the byte length, but at least one so
    /// an end-of-input point still gets a caret.
    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start).max(1)
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::DUMMY
    }
}

/// Resolved location with file path, line, and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// File path
    pub file: String,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A related location printed under the main message, such as the
/// declaration of a by-reference parameter whose capture was rejected.
#[derive(Debug, Clone)]
pub struct Label {
    /// The span to point at
    pub span: Span,
    /// Message to display at this location
    pub message: String,
}

impl Label {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}
