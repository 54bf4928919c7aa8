use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub project: Option<Project>,
    pub tables: Vec<Table>,
    pub enums: Vec<Enum>,
    pub relationships: Vec<Relationship>,
    pub table_groups: Vec<TableGroup>,
    pub table_partials: Vec<TablePartial>,
    pub sticky_notes: Vec<StickyNote>,
}

impl Document {
    /// First table named `name` in any schema. Use [`Document::table_in`]
    /// when the same name exists in several schemas.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_in(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.schema == schema && t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub name: String,
    pub database_type: Option<String>,
    pub settings: Settings,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub alias: Option<String>,
    pub settings: Settings,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub note: Option<String>,
    /// Partial names in injection order, once per `~name` line.
    pub injected_partials: Vec<String>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub default: Option<AttributeValue>,
    pub note: Option<String>,
    pub settings: Settings,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub is_not_null: bool,
    pub is_unique: bool,
    pub is_increment: bool,
    pub inline_ref: Option<InlineRef>,
}

/// Target of a column-level `ref:` attribute. The source side is the
/// column itself, filled in when the document is assembled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineRef {
    pub kind: RelationKind,
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Index {
    pub columns: Vec<IndexColumn>,
    pub settings: Settings,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_expression: bool,
}

impl Index {
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexColumn {
    Name(String),
    Expression(String),
}

impl IndexColumn {
    pub fn as_str(&self) -> &str {
        match self {
            IndexColumn::Name(s) | IndexColumn::Expression(s) => s,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, IndexColumn::Expression(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enum {
    pub schema: String,
    pub name: String,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumValue {
    pub name: String,
    pub settings: Settings,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub name: Option<String>,
    pub left_schema: Option<String>,
    pub left_table: String,
    pub left_columns: Vec<String>,
    pub right_schema: Option<String>,
    pub right_table: String,
    pub right_columns: Vec<String>,
    pub kind: RelationKind,
    pub settings: Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToMany,  // <
    ManyToOne,  // >
    OneToOne,   // -
    ManyToMany, // <>
}

impl RelationKind {
    /// Unknown symbols fall back to one-to-many.
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol.trim() {
            "<" => Self::OneToMany,
            ">" => Self::ManyToOne,
            "-" => Self::OneToOne,
            "<>" => Self::ManyToMany,
            _ => Self::OneToMany,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::OneToMany => "<",
            Self::ManyToOne => ">",
            Self::OneToOne => "-",
            Self::ManyToMany => "<>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableGroup {
    pub name: String,
    pub settings: Settings,
    pub note: Option<String>,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePartial {
    pub name: String,
    pub settings: Settings,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickyNote {
    pub name: String,
    pub content: String,
}

/// One item of a bracketed attribute list: `[pk, note: 'x']`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribute {
    Flag { name: String },
    Pair { key: String, value: AttributeValue },
}

impl Attribute {
    pub fn flag(name: impl Into<String>) -> Self {
        Attribute::Flag { name: name.into() }
    }

    pub fn pair(key: impl Into<String>, value: AttributeValue) -> Self {
        Attribute::Pair {
            key: key.into(),
            value,
        }
    }

    /// Flag name or pair key; the identity used when merging settings.
    pub fn name(&self) -> &str {
        match self {
            Attribute::Flag { name } => name,
            Attribute::Pair { key, .. } => key,
        }
    }

    fn same_slot(&self, other: &Attribute) -> bool {
        matches!(
            (self, other),
            (Attribute::Flag { .. }, Attribute::Flag { .. })
                | (Attribute::Pair { .. }, Attribute::Pair { .. })
        ) && self.name() == other.name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// `'text'`, `"text"` or `'''multi-line text'''`, delimiters removed.
    Text(String),
    /// `` `expr` ``, kept as written without the backticks.
    Expression(String),
    /// An unquoted token.
    Bare(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> &str {
        match self {
            AttributeValue::Text(s) | AttributeValue::Expression(s) | AttributeValue::Bare(s) => s,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, AttributeValue::Expression(_))
    }
}

/// Ordered attribute sequence. Unknown flags and keys are kept as-is;
/// lookups see the last occurrence of a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Settings(Vec<Attribute>);

impl Settings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, attr: Attribute) {
        self.0.push(attr);
    }

    pub fn extend(&mut self, other: Settings) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.iter().rev().find_map(|a| match a {
            Attribute::Pair { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).map(AttributeValue::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.0
            .iter()
            .any(|a| matches!(a, Attribute::Flag { name } if name == flag))
    }

    pub fn contains(&self, attr: &Attribute) -> bool {
        self.0.iter().any(|a| a.same_slot(attr))
    }

    /// Add `attr` only if no entry with the same key or flag exists.
    pub fn insert_missing(&mut self, attr: Attribute) {
        if !self.contains(&attr) {
            self.0.push(attr);
        }
    }

    /// Add `attr`, dropping existing entries with the same key or flag.
    pub fn insert_replacing(&mut self, attr: Attribute) {
        self.0.retain(|a| !a.same_slot(&attr));
        self.0.push(attr);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Attribute> for Settings {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Settings {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
