//! Source file cache for diagnostic rendering.

use crate::span::{FileId, Location, Span};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A cached source file with line information.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub source: String,
    /// Byte offsets where each line starts
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(id: FileId, path: PathBuf, source: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .char_indices()
                    .filter(|&(_, c)| c == '\n')
                    .map(|(i, _)| (i + 1) as u32),
            )
            .collect();
        Self {
            id,
            path,
            source,
            line_starts,
        }
    }

    /// Line and column (both 1-indexed) of a byte offset.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source.len() as u32);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let column = offset - self.line_starts[line_idx] + 1;
        ((line_idx + 1) as u32, column)
    }

    /// Text of a 1-indexed line, without its line terminator.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches(&['\n', '\r'][..]))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn slice(&self, start: u32, end: u32) -> Option<&str> {
        self.source.get(start as usize..end as usize)
    }
}

/// Cache of source files for diagnostic rendering.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<FileId, SourceFile>,
    path_to_id: HashMap<PathBuf, FileId>,
    next_id: u32,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the cache. Adding the same path twice returns the
    /// existing id.
    pub fn add_file(&mut self, path: impl AsRef<Path>, source: String) -> FileId {
        let path = path.as_ref().to_path_buf();
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }

        let id = FileId(self.next_id);
        self.next_id += 1;
        self.files.insert(id, SourceFile::new(id, path.clone(), source));
        self.path_to_id.insert(path, id);
        id
    }

    pub fn get_file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(&id)
    }

    pub fn get_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
        self.path_to_id.get(path.as_ref()).copied()
    }

    /// Resolve a span to a file/line/column location.
    pub fn location(&self, span: Span) -> Option<Location> {
        if span.is_dummy() {
            return None;
        }
        let file = self.files.get(&span.file_id)?;
        let (line, column) = file.line_column(span.start);
        Some(Location {
            file: file.path.to_string_lossy().into_owned(),
            line,
            column,
        })
    }

    /// Source text covered by a span.
    pub fn source_text(&self, span: Span) -> Option<&str> {
        if span.is_dummy() {
            return None;
        }
        self.files.get(&span.file_id)?.slice(span.start, span.end)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("main.fj", "(block\n  ((x int))\n  x)".to_string());
        let file = cache.get_file(id).unwrap();

        assert_eq!(file.line_column(0), (1, 1));
        assert_eq!(file.line_column(7), (2, 1));
        assert_eq!(file.line_column(10), (2, 4));
        assert_eq!(file.line_count(), 3);
    }

    #[test]
    fn test_line_text() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("main.fj", "one\r\ntwo\nthree".to_string());
        let file = cache.get_file(id).unwrap();

        assert_eq!(file.line_text(1), Some("one"));
        assert_eq!(file.line_text(2), Some("two"));
        assert_eq!(file.line_text(3), Some("three"));
        assert_eq!(file.line_text(0), None);
        assert_eq!(file.line_text(4), None);
    }

    #[test]
    fn test_same_path_reuses_id() {
        let mut cache = SourceCache::new();
        let a = cache.add_file("main.fj", "1".to_string());
        let b = cache.add_file("main.fj", "2".to_string());
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_location_and_text() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("main.fj", "(set! x 1)\n(set! y 2)".to_string());

        let span = Span::new(id, 17, 18);
        let loc = cache.location(span).unwrap();
        assert_eq!((loc.line, loc.column), (2, 7));
        assert_eq!(cache.source_text(span), Some("y"));
        assert!(cache.location(Span::DUMMY).is_none());
    }
}
