use std::fmt;

use serde::Serialize;
use unicode_width::UnicodeWidthStr;

/// What the parser skipped or could not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A block header whose `{` is never closed.
    UnterminatedBlock,
    /// Top-level text that is not a recognised declaration.
    UnknownDeclaration,
    /// A second `Project` block; only the first is kept.
    DuplicateDeclaration,
    /// A line inside a block that matches none of the block's line forms.
    MalformedLine,
    /// A nested `{ }` group the enclosing block does not understand.
    UnknownSection,
    /// `~name` naming a partial that was never declared.
    UnknownPartial,
    /// A relationship endpoint naming neither a table nor an alias.
    UnresolvedEndpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 1-based line in the input.
    pub line: usize,
    /// 1-based display column in the input.
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic located at byte `offset` of `source`. Callers
    /// reporting many diagnostics should go through a [`LineIndex`].
    pub fn at(source: &str, offset: usize, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        LineIndex::new(source).diagnostic(offset, kind, message)
    }

    fn located((line, column): (usize, usize), kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            message: message.into(),
        }
    }

    /// A diagnostic with no meaningful position.
    pub fn unplaced(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            line: 0,
            column: 0,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}:{}: {}", self.line, self.column, self.message)
        }
    }
}

/// Line start offsets of a text, for turning byte offsets into positions
/// without rescanning from the top.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    /// 1-based line and display column of byte `offset`.
    pub fn locate(&self, offset: usize) -> (usize, usize) {
        let mut offset = offset.min(self.source.len());
        while !self.source.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.starts.partition_point(|&start| start <= offset);
        let line_start = self.starts[line - 1];
        let column = UnicodeWidthStr::width(&self.source[line_start..offset]) + 1;
        (line, column)
    }

    pub fn diagnostic(&self, offset: usize, kind: DiagnosticKind, message: impl Into<String>) -> Diagnostic {
        Diagnostic::located(self.locate(offset), kind, message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{} problem(s) in input, first: {first}", .diagnostics.len())]
    Rejected {
        first: Diagnostic,
        diagnostics: Vec<Diagnostic>,
    },
}

impl ParseError {
    /// `None` when there is nothing to reject.
    pub fn rejected(diagnostics: Vec<Diagnostic>) -> Option<Self> {
        let first = diagnostics.first()?.clone();
        Some(ParseError::Rejected { first, diagnostics })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ParseError::Rejected { diagnostics, .. } => diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position() {
        let source = "Table a {\n  id int\n  ???\n}";
        let offset = source.find("???").unwrap();
        let d = Diagnostic::at(source, offset, DiagnosticKind::MalformedLine, "bad line");
        assert_eq!((d.line, d.column), (3, 3));
        assert_eq!(d.to_string(), "3:3: bad line");
    }

    #[test]
    fn test_line_index() {
        let source = "a\n\nbc\nd";
        let index = LineIndex::new(source);
        assert_eq!(index.locate(0), (1, 1));
        assert_eq!(index.locate(1), (1, 2));
        assert_eq!(index.locate(2), (2, 1));
        assert_eq!(index.locate(4), (3, 2));
        assert_eq!(index.locate(source.len()), (4, 2));
        assert_eq!(index.locate(usize::MAX), (4, 2));
    }

    #[test]
    fn test_wide_characters_column() {
        let source = "名前 x";
        let d = Diagnostic::at(source, source.find('x').unwrap(), DiagnosticKind::MalformedLine, "");
        assert_eq!(d.column, 6);
    }

    #[test]
    fn test_rejected_error() {
        assert!(ParseError::rejected(vec![]).is_none());

        let d = Diagnostic::unplaced(DiagnosticKind::UnknownPartial, "unknown partial `base`");
        let err = ParseError::rejected(vec![d.clone(), d]).unwrap();
        assert_eq!(err.diagnostics().len(), 2);
        assert_eq!(err.to_string(), "2 problem(s) in input, first: unknown partial `base`");
    }
}
