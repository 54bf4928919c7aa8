//! Compiled patterns for block headers and single-line constructs.
//!
//! Patterns are only ever applied to a header or one line; nesting,
//! quoting and bracket groups are handled by the scanners in
//! [`crate::lexer`] and [`crate::attributes`].

use regex::Regex;
use std::sync::LazyLock;

/// Bare word or a `"`, `'` or `` ` `` quoted name.
const IDENT: &str = r#"(?:"[^"\n]+"|'[^'\n]+'|`[^`\n]+`|\w+)"#;

static SHARED: LazyLock<Grammar> = LazyLock::new(Grammar::new);

/// Immutable set of compiled patterns. Build once, share by reference.
#[derive(Debug)]
pub struct Grammar {
    // Top-level headers, anchored at the keyword.
    pub(crate) project: Regex,
    pub(crate) table: Regex,
    pub(crate) table_partial: Regex,
    pub(crate) table_group: Regex,
    pub(crate) enumeration: Regex,
    pub(crate) sticky_note: Regex,
    pub(crate) reference: Regex,

    // Lines inside bodies.
    pub(crate) column: Regex,
    pub(crate) column_type: Regex,
    pub(crate) partial_injection: Regex,
    pub(crate) note_line: Regex,
    pub(crate) indexes_block: Regex,
    pub(crate) columns_block: Regex,
    pub(crate) nested_block: Regex,
    pub(crate) enum_value: Regex,
    pub(crate) group_member: Regex,

    // Relationships.
    pub(crate) relation_line: Regex,
    pub(crate) endpoint: Regex,
    pub(crate) inline_ref: Regex,
}

impl Grammar {
    pub fn new() -> Self {
        let endpoint = format!(r"(?:{IDENT}\.){{1,2}}(?:\([^)]*\)|{IDENT})");

        Self {
            project: compile(&format!(r"\A(?i:project)\b(?:\s+(?P<name>{IDENT}))?")),
            table: compile(&format!(
                r"\A(?i:table)\s+(?:(?P<schema>{IDENT})\.)?(?P<name>{IDENT})(?:\s+(?i:as)\s+(?P<alias>{IDENT}))?"
            )),
            table_partial: compile(&format!(r"\A(?i:tablepartial)\s+(?P<name>{IDENT})")),
            table_group: compile(&format!(r"\A(?i:tablegroup)\s+(?P<name>{IDENT})")),
            enumeration: compile(&format!(
                r"\A(?i:enum)\s+(?:(?P<schema>{IDENT})\.)?(?P<name>{IDENT})"
            )),
            sticky_note: compile(&format!(r"\A(?i:note)\s+(?P<name>{IDENT})")),
            reference: compile(&format!(
                r"\A(?i:ref)\b(?:\s+(?P<name>{IDENT}))?\s*(?P<open>[:{{])"
            )),

            column: compile(&format!(r"\A(?P<name>{IDENT})\s+(?P<rest>\S.*)\z")),
            column_type: compile(r"\A[^{}:~\[\]]+(?:\[\])*\z"),
            partial_injection: compile(&format!(r"\A~(?P<name>{IDENT})\z")),
            note_line: compile(r"\A(?i:note)\s*(?P<open>[:{])"),
            indexes_block: compile(r"\A(?i:indexes)\s*\{"),
            columns_block: compile(r"\A(?i:columns)\s*\{"),
            nested_block: compile(r"\A\w+\s*\{"),
            enum_value: compile(&format!(r"\A(?P<name>{IDENT})\s*(?P<rest>.*)\z")),
            group_member: compile(&format!(r"\A(?:{IDENT}\.)?{IDENT}\z")),

            relation_line: compile(&format!(
                r"\A(?P<left>{endpoint})\s*(?P<op><>|<|>|-)\s*(?P<right>{endpoint})\s*(?P<rest>.*)\z"
            )),
            endpoint: compile(&format!(
                r"\A(?:(?P<schema>{IDENT})\.)?(?P<table>{IDENT})\.(?:\((?P<cols>[^)]*)\)|(?P<col>{IDENT}))\z"
            )),
            inline_ref: compile(&format!(
                r"\A(?P<op><>|<|>|-)\s*(?P<target>(?:{IDENT}\.){{1,2}}{IDENT})\z"
            )),
        }
    }

    /// Process-wide instance, compiled on first use.
    pub fn shared() -> &'static Grammar {
        &SHARED
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid grammar pattern `{pattern}`: {e}"))
}
