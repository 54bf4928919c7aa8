//! Bracketed attribute lists: `[pk, not null] [ref: < other.id, note: 'x']`.

use crate::ast::{Attribute, AttributeValue, Settings};
use crate::lexer::{find_unquoted, matching_close, quoted_end, split_top_level};

/// Parse every bracket group at the start of `text`, in order.
///
/// Returns the concatenated attributes and the offset just past the last
/// `]`. Leading whitespace is skipped; parsing stops at the first
/// character that does not open a group. An unclosed group runs to the
/// end of `text`.
pub fn parse_groups(text: &str) -> (Settings, usize) {
    let bytes = text.as_bytes();
    let mut settings = Settings::new();
    let mut pos = 0;
    let mut end = 0;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'[') {
            break;
        }
        match matching_close(text, pos) {
            Some(close) => {
                settings.extend(parse_list(&text[pos + 1..close]));
                pos = close + 1;
                end = pos;
            }
            None => {
                settings.extend(parse_list(&text[pos + 1..]));
                end = text.len();
                break;
            }
        }
    }

    (settings, end)
}

/// Parse the inside of one bracket group.
pub fn parse_list(content: &str) -> Settings {
    split_top_level(content, b',')
        .into_iter()
        .filter_map(parse_item)
        .collect()
}

fn parse_item(item: &str) -> Option<Attribute> {
    let item = item.trim();
    if item.is_empty() {
        return None;
    }

    if let Some(colon) = find_unquoted(item, 0, b':') {
        let key = item[..colon].trim();
        if is_key(key) {
            let (value, _) = read_value(item[colon + 1..].trim_start());
            return Some(Attribute::pair(normalize(key), value));
        }
    }

    Some(Attribute::flag(normalize(item)))
}

fn is_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ' ' || c == '\t')
}

/// Lower case, runs of whitespace collapsed to one space.
pub fn normalize(word: &str) -> String {
    word.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read one value starting at the beginning of `text`.
///
/// Priority: `'''` block, backtick expression, `'`/`"` string, then a bare
/// token running to the end of the line. Returns the value and the number
/// of bytes consumed.
pub(crate) fn read_value(text: &str) -> (AttributeValue, usize) {
    let bytes = text.as_bytes();

    if text.starts_with("'''") {
        return match text[3..].find("'''") {
            Some(off) => (
                AttributeValue::Text(text[3..3 + off].trim().to_string()),
                3 + off + 3,
            ),
            None => (AttributeValue::Text(text[3..].trim().to_string()), text.len()),
        };
    }

    match bytes.first() {
        Some(b'`') => match text[1..].find('`') {
            Some(off) => (
                AttributeValue::Expression(text[1..1 + off].to_string()),
                off + 2,
            ),
            None => (AttributeValue::Expression(text[1..].trim().to_string()), text.len()),
        },
        Some(&quote @ (b'\'' | b'"')) => {
            let end = quoted_end(bytes, 0);
            if end >= 2 && bytes[end - 1] == quote {
                let inner = &text[1..end - 1];
                (AttributeValue::Text(unescape(inner, quote as char)), end)
            } else {
                let line_end = text.find('\n').unwrap_or(text.len());
                (AttributeValue::Bare(text[..line_end].trim().to_string()), line_end)
            }
        }
        _ => {
            let line_end = text.find('\n').unwrap_or(text.len());
            (AttributeValue::Bare(text[..line_end].trim().to_string()), line_end)
        }
    }
}

fn unescape(inner: &str, quote: char) -> String {
    if !inner.contains('\\') {
        return inner.to_string();
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n) if n == quote || n == '\\' => out.push(n),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
