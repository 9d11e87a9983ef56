use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// All line/column values are 1-based for human-readable error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        let start_line = self.start_line.min(other.start_line);
        let start_col = match self.start_line.cmp(&other.start_line) {
            std::cmp::Ordering::Less => self.start_col,
            std::cmp::Ordering::Greater => other.start_col,
            std::cmp::Ordering::Equal => self.start_col.min(other.start_col),
        };

        let end_line = self.end_line.max(other.end_line);
        let end_col = match self.end_line.cmp(&other.end_line) {
            std::cmp::Ordering::Greater => self.end_col,
            std::cmp::Ordering::Less => other.end_col,
            std::cmp::Ordering::Equal => self.end_col.max(other.end_col),
        };

        Span::new(start_line, start_col, end_line, end_col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Holds the source text for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number.
    ///
    /// Returns `None` if the line number is out of range.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1)) // strip the \n
            .unwrap_or(self.source.len());
        let line = &self.source[start..end];
        Some(line.trim_end_matches('\r'))
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_point_is_zero_width() {
        let s = Span::point(2, 9);
        assert_eq!(s.start_line, 2);
        assert_eq!(s.end_line, 2);
        assert_eq!(s.start_col, 9);
        assert_eq!(s.end_col, 9);
    }

    #[test]
    fn span_merge_across_lines() {
        let a = Span::new(1, 4, 1, 12);
        let b = Span::new(3, 2, 3, 7);
        let merged = a.merge(b);
        assert_eq!(merged, Span::new(1, 4, 3, 7));
    }

    #[test]
    fn span_merge_same_line() {
        let a = Span::new(5, 6, 5, 11);
        let b = Span::new(5, 2, 5, 8);
        let merged = a.merge(b);
        assert_eq!(merged, Span::new(5, 2, 5, 11));
    }

    #[test]
    fn span_display() {
        assert_eq!(Span::new(7, 3, 7, 9).to_string(), "7:3");
    }

    #[test]
    fn source_file_line_extraction() {
        let src = SourceFile::new("test.mpl", "var a = 1;\nset(1, 2);\nstep();");
        assert_eq!(src.line(1), Some("var a = 1;"));
        assert_eq!(src.line(2), Some("set(1, 2);"));
        assert_eq!(src.line(3), Some("step();"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn source_file_crlf() {
        let src = SourceFile::new("test.mpl", "clear();\r\nstep();\r\n");
        assert_eq!(src.line(1), Some("clear();"));
        assert_eq!(src.line(2), Some("step();"));
    }

    #[test]
    fn source_file_empty() {
        let src = SourceFile::new("test.mpl", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
    }
}
