use tracing::debug;

use crate::ast::*;
use crate::attributes::{normalize, parse_groups, read_value};
use crate::error::{Diagnostic, DiagnosticKind, LineIndex, ParseError};
use crate::grammar::Grammar;
use crate::lexer::{matching_close, split_path, strip_comments, unquote, unquote_text, Cursor};
use crate::options::ParseOptions;
use crate::resolve;
use crate::scanner::{Block, BlockKind, BlockScanner};

mod relationship;
mod table;

/// Result of one parse: the document plus everything that was skipped
/// on the way.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
    strict: bool,
}

impl ParseOutput {
    /// The document, or in strict mode an error if anything was skipped
    /// or left unresolved.
    pub fn into_result(self) -> Result<Document, ParseError> {
        match (self.strict, ParseError::rejected(self.diagnostics)) {
            (true, Some(err)) => Err(err),
            _ => Ok(self.document),
        }
    }
}

pub struct Parser<'a> {
    input: &'a str,
    grammar: &'a Grammar,
    options: ParseOptions,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_options(input, ParseOptions::default())
    }

    pub fn with_options(input: &'a str, options: ParseOptions) -> Self {
        Self::with_grammar(input, Grammar::shared(), options)
    }

    pub fn with_grammar(input: &'a str, grammar: &'a Grammar, options: ParseOptions) -> Self {
        Self {
            input,
            grammar,
            options,
        }
    }

    pub fn parse(self) -> ParseOutput {
        let text = strip_comments(self.input);
        let mut session = Session {
            lines: LineIndex::new(&text),
            grammar: self.grammar,
            options: self.options,
            diagnostics: Vec::new(),
        };

        let mut scanner = BlockScanner::new(&text, self.grammar);
        let blocks: Vec<Block<'_>> = scanner.by_ref().collect();
        session.diagnostics.extend(scanner.into_diagnostics());

        let mut document = Document::default();

        // Partials first: tables may inject any of them regardless of
        // declaration order.
        for block in blocks.iter().filter(|b| b.kind == BlockKind::TablePartial) {
            let partial = session.parse_partial(block, &document.table_partials);
            document.table_partials.push(partial);
        }

        for block in blocks.iter().filter(|b| b.kind == BlockKind::Table) {
            let table = session.parse_table(block, &document.table_partials);
            document.tables.push(table);
        }

        for block in &blocks {
            match block.kind {
                BlockKind::Project => {
                    if document.project.is_some() {
                        session.report(
                            block.offset,
                            DiagnosticKind::DuplicateDeclaration,
                            "only the first `Project` block is used",
                        );
                    } else {
                        document.project = Some(session.parse_project(block));
                    }
                }
                BlockKind::Enum => document.enums.push(session.parse_enum(block)),
                BlockKind::TableGroup => document.table_groups.push(session.parse_table_group(block)),
                BlockKind::StickyNote => document.sticky_notes.push(parse_sticky_note(block)),
                BlockKind::RefShort => {
                    if let Some(rel) = session.parse_short_ref(block) {
                        document.relationships.push(rel);
                    }
                }
                BlockKind::RefBlock => {
                    let rels = session.parse_ref_block(block);
                    document.relationships.extend(rels);
                }
                BlockKind::Table | BlockKind::TablePartial => {}
            }
        }

        let document = resolve::assemble(document, &mut session.diagnostics);

        let mut diagnostics = session.diagnostics;
        diagnostics.sort_by_key(|d| if d.line == 0 { usize::MAX } else { d.line });

        debug!(
            tables = document.tables.len(),
            relationships = document.relationships.len(),
            diagnostics = diagnostics.len(),
            "parsed document"
        );

        ParseOutput {
            document,
            diagnostics,
            strict: self.options.strict,
        }
    }
}

/// State for one parse call. Offsets handed to [`Session::report`] are
/// byte offsets into the comment-free text, which line up with the
/// caller's input.
pub(crate) struct Session<'t> {
    lines: LineIndex<'t>,
    grammar: &'t Grammar,
    options: ParseOptions,
    diagnostics: Vec<Diagnostic>,
}

impl Session<'_> {
    fn report(&mut self, offset: usize, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = self.lines.diagnostic(offset, kind, message);
        debug!(
            line = diagnostic.line,
            column = diagnostic.column,
            kind = ?diagnostic.kind,
            "{}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    fn parse_project(&mut self, block: &Block<'_>) -> Project {
        let mut settings = block.settings.clone();
        settings.extend(self.parse_body_settings(block.body, block.offset));

        Project {
            name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
            database_type: settings.get_str("database_type").map(str::to_string),
            note: settings.get_str("note").map(str::to_string),
            settings,
        }
    }

    /// `key: value` lines, `key { ... }` groups and bare flag lines.
    fn parse_body_settings(&mut self, body: &str, offset: usize) -> Settings {
        let mut settings = Settings::new();
        let mut cursor = Cursor::new(body);

        loop {
            cursor.skip_whitespace();
            if cursor.is_eof() {
                break;
            }

            let start = cursor.pos();
            let rest = cursor.rest();
            let key_len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let after_key = rest[key_len..].trim_start_matches([' ', '\t']);
            let sep = start + (rest.len() - after_key.len());

            match after_key.as_bytes().first() {
                Some(b':') if key_len > 0 => {
                    let value_text = after_key[1..].trim_start_matches([' ', '\t']);
                    let value_start = body.len() - value_text.len();
                    let (value, used) = read_value(value_text);
                    settings.push(Attribute::pair(normalize(&rest[..key_len]), value));
                    cursor.set_pos(value_start + used);
                    cursor.skip_line();
                }
                Some(b'{') if key_len > 0 => match matching_close(body, sep) {
                    Some(close) => {
                        let inner = unquote_text(&body[sep + 1..close]).to_string();
                        settings.push(Attribute::pair(
                            normalize(&rest[..key_len]),
                            AttributeValue::Text(inner),
                        ));
                        cursor.set_pos(close + 1);
                    }
                    None => {
                        self.report(offset + start, DiagnosticKind::MalformedLine, "unclosed `{`");
                        cursor.skip_line();
                    }
                },
                _ => {
                    let line = cursor.take_line().trim();
                    settings.push(Attribute::flag(normalize(line)));
                }
            }
        }

        settings
    }

    /// Read a `Note: value` or `Note { value }` at the cursor. `header_len`
    /// covers the keyword and the `:` or `{`.
    fn read_note(&mut self, body: &str, offset: usize, cursor: &mut Cursor<'_>, header_len: usize) -> Option<String> {
        let start = cursor.pos();
        let open = start + header_len - 1;

        if body.as_bytes()[open] == b'{' {
            return match matching_close(body, open) {
                Some(close) => {
                    cursor.set_pos(close + 1);
                    Some(unquote_text(&body[open + 1..close]).to_string())
                }
                None => {
                    self.report(offset + start, DiagnosticKind::MalformedLine, "unclosed note group");
                    cursor.skip_line();
                    None
                }
            };
        }

        let value_text = body[open + 1..].trim_start_matches([' ', '\t']);
        let value_start = body.len() - value_text.len();
        let (value, used) = read_value(value_text);
        cursor.set_pos(value_start + used);
        cursor.skip_line();
        Some(value.as_str().to_string())
    }

    fn parse_enum(&mut self, block: &Block<'_>) -> Enum {
        let mut values = Vec::new();
        let mut cursor = Cursor::new(block.body);

        while !cursor.is_eof() {
            let line_start = cursor.pos();
            let line = cursor.take_line();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed = self.grammar.enum_value.captures(trimmed).and_then(|caps| {
                let rest = caps.name("rest").map_or("", |m| m.as_str());
                let (settings, end) = parse_groups(rest);
                rest[end..].trim().is_empty().then(|| EnumValue {
                    name: unquote(&caps["name"]).to_string(),
                    note: settings.get_str("note").map(str::to_string),
                    settings,
                })
            });

            match parsed {
                Some(value) => values.push(value),
                None => self.report(
                    block.offset + line_start,
                    DiagnosticKind::MalformedLine,
                    format!("not an enum value: `{trimmed}`"),
                ),
            }
        }

        Enum {
            schema: block.schema.map_or("public", unquote).to_string(),
            name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
            values,
        }
    }

    fn parse_table_group(&mut self, block: &Block<'_>) -> TableGroup {
        let body = block.body;
        let mut settings = block.settings.clone();
        let mut note = settings.get_str("note").map(str::to_string);
        let mut tables = Vec::new();
        let mut cursor = Cursor::new(body);

        loop {
            cursor.skip_whitespace();
            if cursor.is_eof() {
                break;
            }

            if let Some(m) = self.grammar.note_line.find(cursor.rest()) {
                if let Some(text) = self.read_note(body, block.offset, &mut cursor, m.end()) {
                    note = Some(text);
                }
                continue;
            }

            let line_start = cursor.pos();
            let line = cursor.take_line().trim();

            if self.grammar.group_member.is_match(line) {
                tables.push(split_path(line).join("."));
            } else if line.contains(':') {
                let (key, value) = line.split_once(':').unwrap_or((line, ""));
                let (value, _) = read_value(value.trim());
                settings.push(Attribute::pair(normalize(key), value));
            } else {
                self.report(
                    block.offset + line_start,
                    DiagnosticKind::MalformedLine,
                    format!("not a table name: `{line}`"),
                );
            }
        }

        TableGroup {
            name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
            settings,
            note,
            tables,
        }
    }
}

fn parse_sticky_note(block: &Block<'_>) -> StickyNote {
    StickyNote {
        name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
        content: unquote_text(block.body).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParseOutput {
        Parser::new(input).parse()
    }

    #[test]
    fn test_parse_project() {
        let input = r#"
            Project ecommerce {
              database_type: 'PostgreSQL'
              Note: '''
                # Shop
                Orders and customers.
              '''
              experimental
            }
        "#;
        let doc = parse(input).document;
        let project = doc.project.unwrap();
        assert_eq!(project.name, "ecommerce");
        assert_eq!(project.database_type.as_deref(), Some("PostgreSQL"));
        assert_eq!(project.note.as_deref(), Some("# Shop\n                Orders and customers."));
        assert!(project.settings.has_flag("experimental"));
    }

    #[test]
    fn test_missing_project_is_none() {
        let doc = parse("Table t { id int }").document;
        assert!(doc.project.is_none());
        assert_eq!(doc.tables.len(), 1);
    }

    #[test]
    fn test_duplicate_project() {
        let out = parse("Project a { }\nProject b { }");
        assert_eq!(out.document.project.unwrap().name, "a");
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::DuplicateDeclaration);
    }

    #[test]
    fn test_parse_enum() {
        let input = r#"
            enum shop.order_status {
              created [note: 'Order created']
              "in progress"
              shipped
              ??? bad
            }
        "#;
        let out = parse(input);
        let e = &out.document.enums[0];
        assert_eq!(e.schema, "shop");
        assert_eq!(e.name, "order_status");
        let names: Vec<_> = e.values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["created", "in progress", "shipped"]);
        assert_eq!(e.values[0].note.as_deref(), Some("Order created"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedLine);
        assert_eq!(out.diagnostics[0].line, 6);
    }

    #[test]
    fn test_enum_default_schema() {
        let doc = parse("enum status { a }").document;
        assert_eq!(doc.enums[0].schema, "public");
    }

    #[test]
    fn test_parse_table_group() {
        let input = r#"
            TableGroup user_management [color: #345] {
              Note: 'Users and their orders'
              users
              "sales"."orders"
            }
        "#;
        let doc = parse(input).document;
        let group = &doc.table_groups[0];
        assert_eq!(group.name, "user_management");
        assert_eq!(group.tables, vec!["users", "sales.orders"]);
        assert_eq!(group.note.as_deref(), Some("Users and their orders"));
        assert_eq!(group.settings.get_str("color"), Some("#345"));
    }

    #[test]
    fn test_parse_sticky_notes() {
        let input = r#"
            Note single { 'One line' }
            Note multi {
              '''
              Line one
              Line two
              '''
            }
            Note plain { free text here }
        "#;
        let doc = parse(input).document;
        assert_eq!(doc.sticky_notes.len(), 3);
        assert_eq!(doc.sticky_notes[0].content, "One line");
        assert_eq!(doc.sticky_notes[1].content, "Line one\n              Line two");
        assert_eq!(doc.sticky_notes[2].name, "plain");
        assert_eq!(doc.sticky_notes[2].content, "free text here");
    }

    #[test]
    fn test_strict_mode() {
        let input = "Table t {\n  id int\n  ~missing\n}";
        let lenient = Parser::new(input).parse().into_result().unwrap();
        assert_eq!(lenient.tables[0].columns.len(), 1);

        let err = Parser::with_options(input, ParseOptions::strict())
            .parse()
            .into_result()
            .unwrap_err();
        assert_eq!(err.diagnostics()[0].kind, DiagnosticKind::UnknownPartial);
    }

    #[test]
    fn test_unterminated_tables_parse_in_one_pass() {
        use crate::lexer::DELIMITER_BYTES;

        let input = "Table a {\n".repeat(40_000);
        DELIMITER_BYTES.with(|n| n.set(0));
        let out = parse(&input);
        let visited = DELIMITER_BYTES.with(|n| n.get());

        assert!(out.document.tables.is_empty());
        assert_eq!(out.diagnostics.len(), 40_000);
        assert_eq!(out.diagnostics[39_999].line, 40_000);
        assert!(visited <= input.len(), "{visited} delimiter bytes visited");
    }

    #[test]
    fn test_idempotent() {
        let input = "Table users as U { id int [pk] }\nRef: U.id < posts.user_id\nTable posts { user_id int }";
        assert_eq!(parse(input).document, parse(input).document);
    }

    #[test]
    fn test_custom_grammar_instance() {
        let grammar = Grammar::new();
        let out = Parser::with_grammar("enum e { a }", &grammar, ParseOptions::default()).parse();
        assert_eq!(out.document.enums.len(), 1);
    }
}
