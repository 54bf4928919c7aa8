use crate::ast::*;
use crate::attributes::parse_groups;
use crate::error::DiagnosticKind;
use crate::lexer::{split_path, split_top_level, unquote, Cursor};
use crate::scanner::Block;

use super::Session;

struct Endpoint {
    schema: Option<String>,
    table: String,
    columns: Vec<String>,
}

impl Session<'_> {
    /// `Ref name?: a.b > c.d [settings]`
    pub(super) fn parse_short_ref(&mut self, block: &Block<'_>) -> Option<Relationship> {
        let rel = self.parse_relation_line(block.body, block.name);
        if rel.is_none() {
            self.report(
                block.offset,
                DiagnosticKind::MalformedLine,
                format!("not a relationship: `{}`", block.body.trim()),
            );
        }
        rel
    }

    /// `Ref name? { ... }`, one relationship per line.
    pub(super) fn parse_ref_block(&mut self, block: &Block<'_>) -> Vec<Relationship> {
        let mut rels = Vec::new();
        let mut cursor = Cursor::new(block.body);

        while !cursor.is_eof() {
            let start = cursor.pos();
            let line = cursor.take_line().trim();
            if line.is_empty() {
                continue;
            }
            match self.parse_relation_line(line, block.name) {
                Some(rel) => rels.push(rel),
                None => self.report(
                    block.offset + start,
                    DiagnosticKind::MalformedLine,
                    format!("not a relationship: `{line}`"),
                ),
            }
        }

        rels
    }

    fn parse_relation_line(&self, line: &str, name: Option<&str>) -> Option<Relationship> {
        let caps = self.grammar.relation_line.captures(line.trim())?;

        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let (settings, end) = parse_groups(rest);
        if !rest[end..].trim().is_empty() {
            return None;
        }
        // Relationships carry no flags; only key/value settings are kept.
        let settings: Settings = settings
            .iter()
            .filter(|attr| matches!(attr, Attribute::Pair { .. }))
            .cloned()
            .collect();

        let left = self.parse_endpoint(&caps["left"])?;
        let right = self.parse_endpoint(&caps["right"])?;

        Some(Relationship {
            name: name.map(|n| unquote(n).to_string()),
            left_schema: left.schema,
            left_table: left.table,
            left_columns: left.columns,
            right_schema: right.schema,
            right_table: right.table,
            right_columns: right.columns,
            kind: RelationKind::from_symbol(&caps["op"]),
            settings,
        })
    }

    fn parse_endpoint(&self, text: &str) -> Option<Endpoint> {
        let caps = self.grammar.endpoint.captures(text.trim())?;

        let columns = match (caps.name("cols"), caps.name("col")) {
            (Some(cols), _) => split_top_level(cols.as_str(), b',')
                .into_iter()
                .map(unquote)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            (None, Some(col)) => vec![unquote(col.as_str()).to_string()],
            (None, None) => return None,
        };
        if columns.is_empty() {
            return None;
        }

        Some(Endpoint {
            schema: caps.name("schema").map(|m| unquote(m.as_str()).to_string()),
            table: unquote(&caps["table"]).to_string(),
            columns,
        })
    }

    /// Value of a column's `ref:` attribute, e.g. `> schema.table.column`.
    pub(super) fn parse_inline_ref(&self, value: &str) -> Option<InlineRef> {
        let caps = self.grammar.inline_ref.captures(value.trim())?;
        let mut path = split_path(&caps["target"]);

        let column = path.pop()?;
        let table = path.pop()?;
        Some(InlineRef {
            kind: RelationKind::from_symbol(&caps["op"]),
            schema: path.pop(),
            table,
            column,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::error::DiagnosticKind;
    use crate::parser::Parser;

    fn relationships(input: &str) -> Vec<Relationship> {
        Parser::new(input).parse().document.relationships
    }

    #[test]
    fn test_short_form() {
        let rels = relationships("Ref: posts.user_id > users.id [delete: cascade, update: no action]");
        assert_eq!(rels.len(), 1);
        let rel = &rels[0];
        assert_eq!(rel.name, None);
        assert_eq!(rel.left_table, "posts");
        assert_eq!(rel.left_columns, vec!["user_id"]);
        assert_eq!(rel.right_table, "users");
        assert_eq!(rel.kind, RelationKind::ManyToOne);
        assert_eq!(rel.settings.get_str("delete"), Some("cascade"));
        assert_eq!(rel.settings.get_str("update"), Some("no action"));
    }

    #[test]
    fn test_relationship_flags_ignored() {
        let rels = relationships("Ref: posts.user_id > users.id [deferrable, delete: set null, weird]");
        let settings = &rels[0].settings;
        assert_eq!(settings.len(), 1);
        assert_eq!(settings.get_str("delete"), Some("set null"));
        assert!(!settings.has_flag("deferrable"));
    }

    #[test]
    fn test_named_block_form() {
        let input = r#"
            Ref user_links {
              users.id < posts.user_id
              users.id - profiles.user_id
              users.id <> groups.id
            }
        "#;
        let rels = relationships(input);
        let kinds: Vec<_> = rels.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RelationKind::OneToMany, RelationKind::OneToOne, RelationKind::ManyToMany]
        );
        assert!(rels.iter().all(|r| r.name.as_deref() == Some("user_links")));
    }

    #[test]
    fn test_schema_and_composite_endpoints() {
        let rels = relationships(
            "Ref fk_comp: sales.merchants.(id, \"country code\") < sales.orders.(merchant_id, country)",
        );
        let rel = &rels[0];
        assert_eq!(rel.name.as_deref(), Some("fk_comp"));
        assert_eq!(rel.left_schema.as_deref(), Some("sales"));
        assert_eq!(rel.left_table, "merchants");
        assert_eq!(rel.left_columns, vec!["id", "country code"]);
        assert_eq!(rel.right_columns, vec!["merchant_id", "country"]);
    }

    #[test]
    fn test_quoted_endpoints() {
        let rels = relationships(r#"Ref: "task results"."project_id" > "projects"."id""#);
        assert_eq!(rels[0].left_table, "task results");
        assert_eq!(rels[0].right_table, "projects");
        assert_eq!(rels[0].right_columns, vec!["id"]);
    }

    #[test]
    fn test_malformed_ref_reported() {
        let out = Parser::new("Ref: users.id >> posts.user_id").parse();
        assert!(out.document.relationships.is_empty());
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MalformedLine);
    }

    #[test]
    fn test_source_order_across_forms() {
        let input = "Ref: a.x > b.y\nRef { c.x < d.y }\nRef: e.x - f.y";
        let rels = relationships(input);
        let lefts: Vec<_> = rels.iter().map(|r| r.left_table.as_str()).collect();
        assert_eq!(lefts, vec!["a", "c", "e"]);
    }
}
