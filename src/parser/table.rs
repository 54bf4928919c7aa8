use tracing::debug;

use crate::ast::*;
use crate::attributes::parse_groups;
use crate::error::DiagnosticKind;
use crate::lexer::{find_unquoted, matching_close, quoted_end, split_top_level, unquote, Cursor};
use crate::options::MergePolicy;
use crate::scanner::Block;

use super::Session;

/// Everything a table or partial body contributes.
#[derive(Default)]
struct Body {
    settings: Settings,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    note: Option<String>,
    injected: Vec<String>,
}

impl Session<'_> {
    pub(super) fn parse_table(&mut self, block: &Block<'_>, partials: &[TablePartial]) -> Table {
        let mut body = Body {
            settings: block.settings.clone(),
            ..Body::default()
        };
        self.parse_body(block.body, block.offset, partials, &mut body);

        let note = body
            .note
            .or_else(|| body.settings.get_str("note").map(str::to_string));

        Table {
            schema: block.schema.map_or("public", unquote).to_string(),
            name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
            alias: block.alias.map(|a| unquote(a).to_string()),
            settings: body.settings,
            columns: body.columns,
            indexes: body.indexes,
            note,
            injected_partials: body.injected,
        }
    }

    /// Partials may themselves inject partials declared before them.
    pub(super) fn parse_partial(&mut self, block: &Block<'_>, earlier: &[TablePartial]) -> TablePartial {
        let mut body = Body {
            settings: block.settings.clone(),
            ..Body::default()
        };
        self.parse_body(block.body, block.offset, earlier, &mut body);

        TablePartial {
            name: block.name.map(|n| unquote(n).to_string()).unwrap_or_default(),
            settings: body.settings,
            columns: body.columns,
            indexes: body.indexes,
            note: body.note,
        }
    }

    fn parse_body(&mut self, text: &str, offset: usize, partials: &[TablePartial], out: &mut Body) {
        let g = self.grammar;
        let mut cursor = Cursor::new(text);

        loop {
            cursor.skip_whitespace();
            if cursor.is_eof() {
                break;
            }
            let start = cursor.pos();
            let rest = cursor.rest();

            if let Some(m) = g.note_line.find(rest) {
                if let Some(note) = self.read_note(text, offset, &mut cursor, m.end()) {
                    out.note = Some(note);
                }
                continue;
            }

            let section = if let Some(m) = g.indexes_block.find(rest) {
                Some((m.end(), Section::Indexes))
            } else if let Some(m) = g.columns_block.find(rest) {
                Some((m.end(), Section::Columns))
            } else {
                g.nested_block.find(rest).map(|m| (m.end(), Section::Unknown))
            };

            if let Some((header_len, section)) = section {
                let open = start + header_len - 1;
                let Some(close) = matching_close(text, open) else {
                    self.report(offset + start, DiagnosticKind::MalformedLine, "unclosed `{`");
                    cursor.skip_line();
                    continue;
                };
                let inner = &text[open + 1..close];
                match section {
                    Section::Indexes => {
                        let indexes = self.parse_indexes(inner, offset + open + 1);
                        out.indexes.extend(indexes);
                    }
                    Section::Columns => self.parse_body(inner, offset + open + 1, partials, out),
                    Section::Unknown => {
                        let word = rest[..header_len - 1].trim();
                        self.report(
                            offset + start,
                            DiagnosticKind::UnknownSection,
                            format!("skipped unknown section `{word}`"),
                        );
                    }
                }
                cursor.set_pos(close + 1);
                continue;
            }

            let line = cursor.take_line().trim();

            if let Some(caps) = g.partial_injection.captures(line) {
                self.inject(unquote(&caps["name"]), partials, out, offset + start);
                continue;
            }

            match self.parse_column(line) {
                Some(column) => out.columns.push(column),
                None => self.report(
                    offset + start,
                    DiagnosticKind::MalformedLine,
                    format!("not a column definition: `{line}`"),
                ),
            }
        }
    }

    fn inject(&mut self, name: &str, partials: &[TablePartial], out: &mut Body, offset: usize) {
        let Some(partial) = partials.iter().find(|p| p.name == name) else {
            self.report(
                offset,
                DiagnosticKind::UnknownPartial,
                format!("unknown partial `{name}`"),
            );
            return;
        };

        debug!(partial = name, columns = partial.columns.len(), "injecting partial");
        out.columns.extend(partial.columns.iter().cloned());
        out.indexes.extend(partial.indexes.iter().cloned());
        out.injected.push(partial.name.clone());

        for attr in &partial.settings {
            match self.options.merge_policy {
                MergePolicy::TableWins => out.settings.insert_missing(attr.clone()),
                MergePolicy::PartialWins => out.settings.insert_replacing(attr.clone()),
            }
        }
    }

    /// `name type [attributes...]`. The type runs up to the first `[` that
    /// opens an attribute group, so array types like `int[]` stay whole.
    fn parse_column(&self, line: &str) -> Option<Column> {
        let caps = self.grammar.column.captures(line)?;
        let rest = caps.name("rest")?.as_str();

        let mut search = 0;
        let attr_start = loop {
            match find_unquoted(rest, search, b'[') {
                Some(i) if rest.as_bytes().get(i + 1) == Some(&b']') => search = i + 2,
                found => break found,
            }
        };

        let (data_type, attrs) = match attr_start {
            Some(i) => (rest[..i].trim(), &rest[i..]),
            None => (rest.trim(), ""),
        };
        if !self.grammar.column_type.is_match(data_type) {
            return None;
        }

        let (settings, end) = parse_groups(attrs);
        if !attrs[end..].trim().is_empty() {
            return None;
        }

        let mut column = Column {
            name: unquote(&caps["name"]).to_string(),
            data_type: unquote(data_type).to_string(),
            ..Column::default()
        };

        for attr in &settings {
            match attr {
                Attribute::Flag { name } => match name.as_str() {
                    "pk" | "primary key" => column.is_primary_key = true,
                    "null" => {
                        column.is_nullable = true;
                        column.is_not_null = false;
                    }
                    "not null" => {
                        column.is_not_null = true;
                        column.is_nullable = false;
                    }
                    "unique" => column.is_unique = true,
                    "increment" => column.is_increment = true,
                    _ => {}
                },
                Attribute::Pair { key, value } => match key.as_str() {
                    "note" => column.note = Some(value.as_str().to_string()),
                    "default" => column.default = Some(value.clone()),
                    "ref" => {
                        if let Some(target) = self.parse_inline_ref(value.as_str()) {
                            column.inline_ref = Some(target);
                        }
                    }
                    _ => {}
                },
            }
        }

        if column.is_primary_key {
            column.is_not_null = true;
            column.is_nullable = false;
        }
        column.settings = settings;
        Some(column)
    }

    /// Index items are read as a stream: a parenthesised column list, a
    /// quoted name, a backtick expression or a bare name, each followed by
    /// optional attribute groups.
    fn parse_indexes(&mut self, text: &str, offset: usize) -> Vec<Index> {
        let bytes = text.as_bytes();
        let mut indexes = Vec::new();
        let mut pos = 0;

        loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }

            let item = match bytes[pos] {
                b'(' => matching_close(text, pos).map(|close| {
                    let columns = split_top_level(&text[pos + 1..close], b',')
                        .into_iter()
                        .filter(|c| !c.trim().is_empty())
                        .map(index_column)
                        .collect::<Vec<_>>();
                    (columns, close + 1)
                }),
                b'`' | b'"' | b'\'' => {
                    let end = quoted_end(bytes, pos);
                    (end > pos + 1).then(|| (vec![index_column(&text[pos..end])], end))
                }
                b if is_word_byte(b) => {
                    let end = bytes[pos..]
                        .iter()
                        .position(|&b| !is_word_byte(b))
                        .map_or(bytes.len(), |n| pos + n);
                    Some((vec![IndexColumn::Name(text[pos..end].to_string())], end))
                }
                _ => None,
            };

            let Some((columns, after)) = item.filter(|(columns, _)| !columns.is_empty()) else {
                let line_end = text[pos..].find('\n').map_or(text.len(), |n| pos + n);
                self.report(
                    offset + pos,
                    DiagnosticKind::MalformedLine,
                    format!("not an index definition: `{}`", text[pos..line_end].trim()),
                );
                pos = line_end;
                continue;
            };

            let (settings, consumed) = parse_groups(&text[after..]);
            pos = after + consumed;

            indexes.push(Index {
                is_primary_key: settings.has_flag("pk") || settings.has_flag("primary key"),
                is_unique: settings.has_flag("unique"),
                is_expression: columns.iter().any(IndexColumn::is_expression),
                columns,
                settings,
            });
        }

        indexes
    }
}

enum Section {
    Indexes,
    Columns,
    Unknown,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn index_column(raw: &str) -> IndexColumn {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('`') && raw.ends_with('`') {
        IndexColumn::Expression(raw[1..raw.len() - 1].to_string())
    } else {
        IndexColumn::Name(unquote(raw).to_string())
    }
}
