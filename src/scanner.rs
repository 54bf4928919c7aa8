//! Top-level block discovery.
//!
//! Walks the comment-free document token by token outside of any brace
//! group, tries each declaration header at every token start and pairs
//! the header's `{` with its closing `}` from a delimiter table built in
//! one pass, so bodies of any nesting depth are captured whole and an
//! unclosed `{` never triggers a rescan of the rest of the input.

use tracing::trace;

use crate::ast::Settings;
use crate::attributes::parse_list;
use crate::error::{Diagnostic, DiagnosticKind, LineIndex};
use crate::grammar::Grammar;
use crate::lexer::{find_unquoted, DelimiterPairs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Project,
    Table,
    TablePartial,
    TableGroup,
    Enum,
    StickyNote,
    /// `Ref [name] { ... }`
    RefBlock,
    /// `Ref [name]: ...` up to the end of the line
    RefShort,
}

impl BlockKind {
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::Project => "Project",
            BlockKind::Table => "Table",
            BlockKind::TablePartial => "TablePartial",
            BlockKind::TableGroup => "TableGroup",
            BlockKind::Enum => "enum",
            BlockKind::StickyNote => "Note",
            BlockKind::RefBlock | BlockKind::RefShort => "Ref",
        }
    }
}

/// One declaration: header captures (still quoted) and its body text.
#[derive(Debug, Clone)]
pub struct Block<'a> {
    pub kind: BlockKind,
    pub schema: Option<&'a str>,
    pub name: Option<&'a str>,
    pub alias: Option<&'a str>,
    pub settings: Settings,
    pub body: &'a str,
    /// Byte offset of `body` in the scanned text.
    pub offset: usize,
}

struct Header<'a> {
    kind: BlockKind,
    schema: Option<&'a str>,
    name: Option<&'a str>,
    alias: Option<&'a str>,
    len: usize,
}

pub struct BlockScanner<'a, 'g> {
    text: &'a str,
    grammar: &'g Grammar,
    pairs: DelimiterPairs,
    lines: LineIndex<'a>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, 'g> BlockScanner<'a, 'g> {
    pub fn new(text: &'a str, grammar: &'g Grammar) -> Self {
        Self {
            text,
            grammar,
            pairs: DelimiterPairs::new(text),
            lines: LineIndex::new(text),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn line_end(&self, from: usize) -> usize {
        self.text[from..]
            .find('\n')
            .map(|off| from + off)
            .unwrap_or(self.text.len())
    }

    /// Bracket groups between a header and its `{`. `None` when a group is
    /// never closed.
    fn header_settings(&self, from: usize) -> Option<(Settings, usize)> {
        let bytes = self.text.as_bytes();
        let mut settings = Settings::new();
        let mut p = from;

        loop {
            while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                p += 1;
            }
            if bytes.get(p) != Some(&b'[') {
                return Some((settings, p));
            }
            let close = self.pairs.close_of(p)?;
            settings.extend(parse_list(&self.text[p + 1..close]));
            p = close + 1;
        }
    }

    fn match_header(&self, rest: &'a str) -> Option<Header<'a>> {
        let g = self.grammar;
        let candidates = [
            (&g.table_partial, BlockKind::TablePartial),
            (&g.table_group, BlockKind::TableGroup),
            (&g.table, BlockKind::Table),
            (&g.project, BlockKind::Project),
            (&g.enumeration, BlockKind::Enum),
            (&g.sticky_note, BlockKind::StickyNote),
        ];

        if let Some(caps) = g.reference.captures(rest) {
            let kind = if &caps["open"] == ":" {
                BlockKind::RefShort
            } else {
                BlockKind::RefBlock
            };
            return Some(Header {
                kind,
                schema: None,
                name: caps.name("name").map(|m| m.as_str()),
                alias: None,
                len: caps.get(0).map_or(0, |m| m.end()),
            });
        }

        candidates.into_iter().find_map(|(re, kind)| {
            let caps = re.captures(rest)?;
            Some(Header {
                kind,
                schema: caps.name("schema").map(|m| m.as_str()),
                name: caps.name("name").map(|m| m.as_str()),
                alias: caps.name("alias").map(|m| m.as_str()),
                len: caps.get(0).map_or(0, |m| m.end()),
            })
        })
    }

    /// Skip the rest of an unrecognised line, or the whole brace group it
    /// opens.
    fn skip_unknown(&mut self) {
        let end = self.line_end(self.pos);
        let line = &self.text[self.pos..end];
        self.diagnostics.push(self.lines.diagnostic(
            self.pos,
            DiagnosticKind::UnknownDeclaration,
            format!("skipped unrecognised text `{}`", preview(line)),
        ));

        self.pos = match find_unquoted(line, 0, b'{') {
            Some(open) => match self.pairs.close_of(self.pos + open) {
                Some(close) => close + 1,
                None => end,
            },
            None => end,
        };
    }
}

impl<'a> Iterator for BlockScanner<'a, '_> {
    type Item = Block<'a>;

    fn next(&mut self) -> Option<Block<'a>> {
        loop {
            self.skip_whitespace();
            if self.pos >= self.text.len() {
                return None;
            }

            let start = self.pos;
            let rest = &self.text[start..];
            let Some(header) = self.match_header(rest) else {
                self.skip_unknown();
                continue;
            };
            let mut p = start + header.len;

            if header.kind == BlockKind::RefShort {
                let end = self.line_end(p);
                self.pos = end;
                trace!(name = ?header.name, "found short ref");
                return Some(Block {
                    kind: header.kind,
                    schema: None,
                    name: header.name,
                    alias: None,
                    settings: Settings::new(),
                    body: &self.text[p..end],
                    offset: p,
                });
            }

            let settings = if header.kind == BlockKind::RefBlock {
                // The header pattern already consumed the `{`.
                p -= 1;
                Settings::new()
            } else {
                let Some((settings, next)) = self.header_settings(p) else {
                    self.skip_unknown();
                    continue;
                };
                p = next;
                settings
            };

            if self.text.as_bytes().get(p) != Some(&b'{') {
                self.skip_unknown();
                continue;
            }

            let Some(close) = self.pairs.close_of(p) else {
                self.diagnostics.push(self.lines.diagnostic(
                    start,
                    DiagnosticKind::UnterminatedBlock,
                    format!("`{}` block is never closed", header.kind.keyword()),
                ));
                self.pos = p + 1;
                continue;
            };

            self.pos = close + 1;
            trace!(kind = ?header.kind, name = ?header.name, "found block");
            return Some(Block {
                kind: header.kind,
                schema: header.schema,
                name: header.name,
                alias: header.alias,
                settings,
                body: &self.text[p + 1..close],
                offset: p + 1,
            });
        }
    }
}

fn preview(line: &str) -> String {
    let line = line.trim();
    match line.char_indices().nth(40) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> (Vec<Block<'_>>, Vec<Diagnostic>) {
        let mut scanner = BlockScanner::new(text, Grammar::shared());
        let blocks: Vec<_> = scanner.by_ref().collect();
        (blocks, scanner.into_diagnostics())
    }

    #[test]
    fn test_finds_all_kinds() {
        let text = r#"
            Project p { database_type: 'PostgreSQL' }
            Table s.users as U [headercolor: #fff] { id int }
            TablePartial base { created_at timestamp }
            TableGroup g { users }
            enum status { active }
            Note todo { 'check this' }
            Ref: a.b > c.d
            Ref named { a.b < c.d }
        "#;
        let (blocks, diagnostics) = scan(text);
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Project,
                BlockKind::Table,
                BlockKind::TablePartial,
                BlockKind::TableGroup,
                BlockKind::Enum,
                BlockKind::StickyNote,
                BlockKind::RefShort,
                BlockKind::RefBlock,
            ]
        );
        assert!(diagnostics.is_empty());

        let table = &blocks[1];
        assert_eq!(table.schema, Some("s"));
        assert_eq!(table.name, Some("users"));
        assert_eq!(table.alias, Some("U"));
        assert_eq!(table.settings.get_str("headercolor"), Some("#fff"));
        assert_eq!(table.body.trim(), "id int");
        assert_eq!(&text[table.offset..table.offset + table.body.len()], table.body);

        assert_eq!(blocks[6].body.trim(), "a.b > c.d");
        assert_eq!(blocks[7].name, Some("named"));
    }

    #[test]
    fn test_deeply_nested_body() {
        let text = "Table t {\n  id int\n  indexes {\n    (a, b) [note: '{x}']\n    { { } }\n  }\n}\nenum e { x }";
        let (blocks, _) = scan(text);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].body.contains("indexes {"));
        assert!(blocks[0].body.trim_end().ends_with('}'));
        assert_eq!(blocks[1].kind, BlockKind::Enum);
    }

    #[test]
    fn test_unterminated_block_is_skipped() {
        let text = "Table a {\n  id int\nTable b { id int }";
        let (blocks, diagnostics) = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, Some("b"));
        assert!(diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnterminatedBlock && d.line == 1));
    }

    #[test]
    fn test_unknown_group_is_skipped_whole() {
        let text = "Widget w {\n  Table inner { id int }\n}\nTable outer { id int }";
        let (blocks, diagnostics) = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, Some("outer"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnknownDeclaration);
    }

    #[test]
    fn test_unclosed_headers_do_not_rescan() {
        use crate::lexer::DELIMITER_BYTES;

        for line in ["Table a {\n", "x {\n", "Table a [note: 'x'\n"] {
            let text = line.repeat(40_000);
            DELIMITER_BYTES.with(|n| n.set(0));
            let (blocks, diagnostics) = scan(&text);
            let visited = DELIMITER_BYTES.with(|n| n.get());

            assert!(blocks.is_empty());
            assert!(diagnostics.len() >= 40_000, "{line:?}");
            assert!(
                visited <= text.len(),
                "{visited} delimiter bytes visited for {} input bytes of {line:?}",
                text.len()
            );
        }
    }

    #[test]
    fn test_unclosed_header_settings() {
        let text = "Table a [note: 'x'\n  id int\n}\nTable b [pk] { id int }";
        let (blocks, diagnostics) = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, Some("b"));
        assert!(blocks[0].settings.has_flag("pk"));
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnknownDeclaration);
        assert_eq!(diagnostics[0].line, 1);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let (blocks, _) = scan("TABLE t { id int }\nREF: t.id - u.id\nENUM e { a }");
        assert_eq!(blocks.len(), 3);
    }
}
