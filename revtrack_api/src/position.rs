use serde::{Deserialize, Serialize};

use crate::change::VcsFileRef;

/// A 1-based line/column pair marking the start of a token.
///
/// Ordering is document order (line, then column, then token length).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column, counted in characters.
    pub column: u32,
    /// Length of the token starting here, in characters.
    #[serde(default)]
    pub length: u32,
}

impl Position {
    /// Convenience constructor.
    pub const fn new(line: u32, column: u32, length: u32) -> Self {
        Self {
            line,
            column,
            length,
        }
    }

    /// Column just past the token (exclusive, 1-based).
    #[must_use]
    pub const fn end_column(&self) -> u32 {
        self.column.saturating_add(self.length)
    }
}

/// A span inside one file version, bounded by the tokens at `begin` and `end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Token opening the span.
    pub begin: Position,
    /// Token closing the span (inclusive).
    pub end: Position,
    /// File version the positions refer to.
    pub file: VcsFileRef,
}

impl Range {
    /// Construct a range with explicit endpoints.
    pub const fn new(begin: Position, end: Position, file: VcsFileRef) -> Self {
        Self { begin, end, file }
    }

    /// Range covering a single token.
    pub const fn token(position: Position, file: VcsFileRef) -> Self {
        Self {
            begin: position,
            end: position,
            file,
        }
    }

    /// Returns `true` when `begin` does not come after `end`.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.begin <= self.end
    }

    /// Returns `true` when both endpoints sit on the same line.
    #[must_use]
    pub const fn is_single_line(&self) -> bool {
        self.begin.line == self.end.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> VcsFileRef {
        VcsFileRef::new("/tmp/a.rs", "a.rs", "r1")
    }

    #[test]
    fn positions_compare_in_document_order() {
        assert!(Position::new(1, 9, 1) < Position::new(2, 1, 1));
        assert!(Position::new(3, 2, 1) < Position::new(3, 4, 1));
        assert_eq!(Position::new(5, 3, 4).end_column(), 7);
        assert_eq!(Position::new(1, 2, u32::MAX).end_column(), u32::MAX);
    }

    #[test]
    fn range_ordering() {
        let ordered = Range::new(Position::new(1, 1, 1), Position::new(2, 1, 1), file());
        assert!(ordered.is_ordered());
        assert!(!ordered.is_single_line());

        let reversed = Range::new(Position::new(4, 1, 1), Position::new(2, 1, 1), file());
        assert!(!reversed.is_ordered());

        let token = Range::token(Position::new(7, 3, 2), file());
        assert!(token.is_single_line());
        assert!(token.is_ordered());
    }

    #[test]
    fn position_length_defaults_to_zero() {
        let position: Position =
            serde_json::from_str(r#"{"line": 5, "column": 2}"#).expect("deserialize position");
        assert_eq!(position, Position::new(5, 2, 0));
    }
}
