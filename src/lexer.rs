//! Character-level scanning shared by every parser stage: comment
//! stripping, quote skipping, balanced delimiter matching and quote-aware
//! splitting.
//!
//! All delimiters are ASCII, so scanning works on bytes and every index
//! handed back is a valid `str` boundary.

#[cfg(test)]
use std::cell::Cell;
use std::collections::HashMap;

/// Remove `//` line comments and `/* */` block comments.
///
/// Removed bytes become spaces (newlines are kept), so every other byte
/// keeps its offset and line number. Markers inside quoted text are left
/// alone.
pub fn strip_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                let end = quoted_end(bytes, i);
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_seq(&bytes[i + 2..], b"*/")
                    .map(|off| i + 2 + off + 2)
                    .unwrap_or(bytes.len());
                out.extend(bytes[i..end].iter().map(|&b| if b == b'\n' { b'\n' } else { b' ' }));
                i = end;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Only whole comments were blanked, so the bytes are still valid UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}

/// End (exclusive) of the quoted literal starting at `start`.
///
/// `'''` blocks may span lines; `'`, `"` and `` ` `` literals end at the
/// line. A quote with no partner is a plain character and only itself is
/// consumed.
pub(crate) fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];

    if quote == b'\'' && bytes[start..].starts_with(b"'''") {
        return match find_seq(&bytes[start + 3..], b"'''") {
            Some(off) => start + 3 + off + 3,
            None => start + 3,
        };
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => break,
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    start + 1
}

fn find_seq(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Index of the delimiter closing the one at `open` (`{`, `[` or `(`).
///
/// A plain depth counter; quoted text is skipped. `None` when the group is
/// never closed.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (opener, closer) = match bytes.get(open)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        b'(' => (b'(', b')'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        count_visit();
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = quoted_end(bytes, i);
                continue;
            }
            b if b == opener => depth += 1,
            b if b == closer => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Every `{` and `[` of a text paired with its closer in one quote-aware
/// pass, so repeated lookups never rescan.
#[derive(Debug, Clone, Default)]
pub struct DelimiterPairs {
    closes: HashMap<usize, usize>,
}

impl DelimiterPairs {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut closes = HashMap::new();
        let mut braces = Vec::new();
        let mut brackets = Vec::new();

        let mut i = 0;
        while i < bytes.len() {
            count_visit();
            match bytes[i] {
                b'\'' | b'"' | b'`' => {
                    i = quoted_end(bytes, i);
                    continue;
                }
                b'{' => braces.push(i),
                b'[' => brackets.push(i),
                b'}' => {
                    if let Some(open) = braces.pop() {
                        closes.insert(open, i);
                    }
                }
                b']' => {
                    if let Some(open) = brackets.pop() {
                        closes.insert(open, i);
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Self { closes }
    }

    /// Closer for the delimiter at `open`; `None` if it is never closed or
    /// `open` is not an unquoted opener.
    pub fn close_of(&self, open: usize) -> Option<usize> {
        self.closes.get(&open).copied()
    }
}

#[cfg(test)]
thread_local! {
    /// Bytes examined by the delimiter scanners on this thread.
    pub(crate) static DELIMITER_BYTES: Cell<usize> = const { Cell::new(0) };
}

#[inline]
fn count_visit() {
    #[cfg(test)]
    DELIMITER_BYTES.with(|n| n.set(n.get() + 1));
}

/// First `target` at or after `from` that is outside quotes and outside
/// any parenthesised group.
pub fn find_unquoted(text: &str, from: usize, target: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b if b == target && depth == 0 => return Some(i),
            b'\'' | b'"' | b'`' => {
                i = quoted_end(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on `sep` where it is outside quotes and outside `()`, `[]`, `{}`.
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = quoted_end(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Strip one matching pair of `"`, `'` or `` ` `` around a trimmed value.
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && matches!(first, b'"' | b'\'' | b'`') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Like [`unquote`], but a `'''` block loses its three-quote delimiters
/// and is trimmed again.
pub fn unquote_text(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 6 && value.starts_with("'''") && value.ends_with("'''") {
        return value[3..value.len() - 3].trim();
    }
    unquote(value)
}

/// Split a dotted path (`"schema"."table"`) into unquoted parts.
pub fn split_path(path: &str) -> Vec<String> {
    split_top_level(path, b'.')
        .into_iter()
        .map(|part| unquote(part).to_string())
        .collect()
}

/// Forward-only reader over a body of text.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn src(&self) -> &'a str {
        self.src
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.src.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Offset of the next `\n` (or end of input).
    pub fn line_end(&self) -> usize {
        self.src[self.pos..]
            .find('\n')
            .map(|off| self.pos + off)
            .unwrap_or(self.src.len())
    }

    /// Current line, without its newline, and move past it.
    pub fn take_line(&mut self) -> &'a str {
        let end = self.line_end();
        let line = &self.src[self.pos..end];
        self.set_pos(end + 1);
        line
    }

    pub fn skip_line(&mut self) {
        let end = self.line_end();
        self.set_pos(end + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments_keeps_positions() {
        let input = "Table a { // trailing\n  id int /* inline */ [pk]\n}";
        let out = strip_comments(input);
        assert_eq!(out.len(), input.len());
        assert_eq!(out.lines().count(), input.lines().count());
        assert!(!out.contains("trailing"));
        assert!(!out.contains("inline"));
        assert_eq!(out.find("[pk]"), input.find("[pk]"));
    }

    #[test]
    fn test_strip_block_comment_across_lines() {
        let input = "a\n/* one\ntwo */b";
        let out = strip_comments(input);
        assert_eq!(out, "a\n      \n      b");
    }

    #[test]
    fn test_comment_markers_in_quotes() {
        let input = "Note: '''see http://dbdiagram.io'''\nurl varchar [default: 'a//b']";
        assert_eq!(strip_comments(input), input);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let out = strip_comments("id int /* never closed\nname text");
        assert_eq!(out.trim_end(), "id int");
    }

    #[test]
    fn test_lone_apostrophe_is_plain_text() {
        let input = "it's fine // gone\nnext";
        assert_eq!(strip_comments(input), "it's fine        \nnext");
    }

    #[test]
    fn test_matching_close_nested() {
        let text = "{ a { b { c } } '}' }";
        assert_eq!(matching_close(text, 0), Some(text.len() - 1));
        assert_eq!(matching_close(text, 4), Some(14));
        assert_eq!(matching_close("{ { }", 0), None);
    }

    #[test]
    fn test_delimiter_pairs_agree_with_matching_close() {
        let text = "{ a { b [c, '}]'] } } { [ ] x { }";
        let pairs = DelimiterPairs::new(text);
        for (open, b) in text.bytes().enumerate() {
            if (b == b'{' || b == b'[') && !text[..open].contains('\'') {
                assert_eq!(pairs.close_of(open), matching_close(text, open), "opener at {open}");
            }
        }
        assert_eq!(pairs.close_of(22), None);
        assert_eq!(pairs.close_of(2), None);
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level("a, 'b, c', (d, e), `f,g`", b',');
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].trim(), "'b, c'");
        assert_eq!(parts[2].trim(), "(d, e)");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"users\""), "users");
        assert_eq!(unquote(" 'x' "), "x");
        assert_eq!(unquote("`now()`"), "now()");
        assert_eq!(unquote("'mismatched\""), "'mismatched\"");
        assert_eq!(unquote_text("'''\n  multi\n  line\n'''"), "multi\n  line");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("\"nuget_packages\".\"id\""), vec!["nuget_packages", "id"]);
        assert_eq!(split_path("s.t.(a, b)"), vec!["s", "t", "(a, b)"]);
    }

    #[test]
    fn test_cursor_lines() {
        let mut cursor = Cursor::new("one\n  two\nthree");
        assert_eq!(cursor.take_line(), "one");
        cursor.skip_whitespace();
        assert_eq!(cursor.take_line(), "two");
        assert_eq!(cursor.take_line(), "three");
        assert!(cursor.is_eof());
    }
}
