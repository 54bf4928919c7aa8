//! Whole-document fix-ups that need every table: inline `ref:` attributes
//! become relationships and table aliases are rewritten to table names.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::ast::{Document, Relationship, Settings, Table};
use crate::error::{Diagnostic, DiagnosticKind};

const DEFAULT_SCHEMA: &str = "public";

pub(crate) fn assemble(mut document: Document, diagnostics: &mut Vec<Diagnostic>) -> Document {
    let resolver = AliasResolver::new(&document.tables);

    for rel in &mut document.relationships {
        resolver.resolve(&mut rel.left_schema, &mut rel.left_table);
        resolver.resolve(&mut rel.right_schema, &mut rel.right_table);
    }

    let inline = inline_relationships(&document.tables);
    document.relationships.extend(inline.into_iter().map(|mut rel| {
        resolver.resolve(&mut rel.right_schema, &mut rel.right_table);
        rel
    }));

    for rel in &document.relationships {
        for table in [&rel.left_table, &rel.right_table] {
            if !resolver.is_known(table) {
                diagnostics.push(Diagnostic::unplaced(
                    DiagnosticKind::UnresolvedEndpoint,
                    format!("relationship endpoint `{table}` names no table or alias"),
                ));
            }
        }
    }

    document
}

/// One relationship per column carrying a `ref:` attribute, in table
/// then column order. The column's table is the left side.
pub fn inline_relationships(tables: &[Table]) -> Vec<Relationship> {
    tables
        .iter()
        .flat_map(|table| {
            table.columns.iter().filter_map(move |column| {
                let target = column.inline_ref.as_ref()?;
                Some(Relationship {
                    name: None,
                    left_schema: non_default_schema(&table.schema),
                    left_table: table.name.clone(),
                    left_columns: vec![column.name.clone()],
                    right_schema: target.schema.clone(),
                    right_table: target.table.clone(),
                    right_columns: vec![target.column.clone()],
                    kind: target.kind,
                    settings: Settings::new(),
                })
            })
        })
        .collect()
}

fn non_default_schema(schema: &str) -> Option<String> {
    (schema != DEFAULT_SCHEMA).then(|| schema.to_string())
}

/// Maps aliases to the tables that declare them. A real table name always
/// takes precedence over an alias spelled the same way.
pub struct AliasResolver<'a> {
    names: HashSet<&'a str>,
    aliases: HashMap<&'a str, &'a Table>,
}

impl<'a> AliasResolver<'a> {
    pub fn new(tables: &'a [Table]) -> Self {
        let names = tables.iter().map(|t| t.name.as_str()).collect();
        let aliases = tables
            .iter()
            .filter_map(|t| Some((t.alias.as_deref()?, t)))
            .collect();
        Self { names, aliases }
    }

    /// Rewrite `table` in place if it is an alias. The schema is filled
    /// from the aliased table when the endpoint gave none.
    pub fn resolve(&self, schema: &mut Option<String>, table: &mut String) {
        if self.names.contains(table.as_str()) {
            return;
        }
        let Some(target) = self.aliases.get(table.as_str()) else {
            return;
        };
        trace!(alias = %table, table = %target.name, "resolved alias");
        *table = target.name.clone();
        if schema.is_none() {
            *schema = non_default_schema(&target.schema);
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.names.contains(name) || self.aliases.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn test_alias_rewritten_everywhere() {
        let input = r#"
            Table auth.users as U {
              id int [pk]
            }
            Table posts {
              id int
              author_id int [ref: > U.id]
            }
            Ref: posts.id - U.id
        "#;
        let out = Parser::new(input).parse();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let rels = &out.document.relationships;
        assert_eq!(rels.len(), 2);

        assert_eq!(rels[0].right_table, "users");
        assert_eq!(rels[0].right_schema.as_deref(), Some("auth"));

        assert_eq!(rels[1].left_table, "posts");
        assert_eq!(rels[1].left_schema, None);
        assert_eq!(rels[1].left_columns, vec!["author_id"]);
        assert_eq!(rels[1].right_table, "users");
        assert_eq!(rels[1].right_columns, vec!["id"]);
    }

    #[test]
    fn test_table_name_beats_alias() {
        let input = "Table a as b { id int }\nTable b { id int }\nRef: a.id > b.id";
        let rels = Parser::new(input).parse().document.relationships;
        assert_eq!(rels[0].right_table, "b");
    }

    #[test]
    fn test_unresolved_endpoint_reported() {
        let input = "Table a { id int }\nRef: a.id > ghost.id";
        let out = Parser::new(input).parse();
        assert_eq!(out.document.relationships.len(), 1);
        assert_eq!(out.document.relationships[0].right_table, "ghost");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::UnresolvedEndpoint);
        assert_eq!(out.diagnostics[0].line, 0);
    }

    #[test]
    fn test_inline_left_schema() {
        let input = "Table shop.orders {\n  user_id int [ref: > users.id]\n}\nTable users { id int }";
        let rels = Parser::new(input).parse().document.relationships;
        assert_eq!(rels[0].left_schema.as_deref(), Some("shop"));
        assert_eq!(rels[0].left_table, "orders");
    }
}
