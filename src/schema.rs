//! Model definitions and the column descriptors derived from them.
//!
//! A model describes itself with a [`ModelDef`]: an ordered list of
//! [`FieldSpec`]s carrying the field identifier, its value kind and typed
//! column attributes. The extractor turns a definition into a
//! [`ModelDescriptor`], which is what the differ and the ORM layer consume.

use std::fmt;
use std::str::FromStr;

use crate::extract::ExtractError;

/// Value kind of a model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// String with a declared maximum length.
    Varchar(u32),
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Timestamp,
    /// Nullable wrapper around another kind.
    Optional(Box<FieldKind>),
    /// Another model or composite value, named by its type.
    Struct(&'static str),
}

impl FieldKind {
    pub fn optional(inner: FieldKind) -> Self {
        FieldKind::Optional(Box::new(inner))
    }

    /// The kind with any `Optional` wrapper removed.
    pub fn base(&self) -> &FieldKind {
        match self {
            FieldKind::Optional(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldKind::Optional(_))
    }

    /// Composite kinds other than timestamps.
    pub fn is_struct(&self) -> bool {
        matches!(self.base(), FieldKind::Struct(_))
    }
}

/// Action taken by the database when a referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl FromStr for ReferentialAction {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            _ => Err(ExtractError::malformed(s, "unknown referential action")),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Relationship carried by an association field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Identifier of the field on this model holding the key.
    pub foreign_key: String,
    /// Identifier of the referenced field; the primary key `ID` when absent.
    pub references: Option<String>,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

impl Relation {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Relation {
            foreign_key: foreign_key.into(),
            references: None,
            on_update: None,
            on_delete: None,
        }
    }

    pub fn references(mut self, field: impl Into<String>) -> Self {
        self.references = Some(field.into());
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// Column attribute attached to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAttr {
    Column(String),
    Type(String),
    PrimaryKey,
    AutoIncrement,
    NotNull,
    Unique,
    Index,
    UniqueIndex,
    Default(String),
    Ignore,
    Relation(Relation),
}

impl ColumnAttr {
    /// Parse a `;`-separated attribute list such as
    /// `"column:user_type;type:varchar(20);not null"`.
    ///
    /// Relationship keys (`foreignKey`, `references`, `constraint`) combine
    /// into a single [`ColumnAttr::Relation`]. Unknown keys and missing
    /// values are errors.
    pub fn parse_list(tag: &str) -> Result<Vec<ColumnAttr>, ExtractError> {
        let mut attrs = Vec::new();
        let mut foreign_key: Option<String> = None;
        let mut references: Option<String> = None;
        let mut on_update = None;
        let mut on_delete = None;

        for item in tag.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if item == "-" {
                attrs.push(ColumnAttr::Ignore);
                continue;
            }
            let (key, value) = match item.split_once(':') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(v.trim())),
                None => (item.to_ascii_lowercase(), None),
            };
            let required = |value: Option<&str>| match value {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(ExtractError::malformed(item, "missing value")),
            };
            let flag = |attr: ColumnAttr| match value {
                None => Ok(attr),
                Some(_) => Err(ExtractError::malformed(item, "flag takes no value")),
            };

            match key.as_str() {
                "column" => attrs.push(ColumnAttr::Column(required(value)?)),
                "type" => attrs.push(ColumnAttr::Type(required(value)?)),
                "default" => attrs.push(ColumnAttr::Default(required(value)?)),
                "primarykey" | "primary_key" => attrs.push(flag(ColumnAttr::PrimaryKey)?),
                "autoincrement" => attrs.push(flag(ColumnAttr::AutoIncrement)?),
                "not null" | "notnull" => attrs.push(flag(ColumnAttr::NotNull)?),
                "unique" => attrs.push(flag(ColumnAttr::Unique)?),
                "index" => attrs.push(flag(ColumnAttr::Index)?),
                "uniqueindex" => attrs.push(flag(ColumnAttr::UniqueIndex)?),
                "foreignkey" => foreign_key = Some(required(value)?),
                "references" => references = Some(required(value)?),
                "constraint" => {
                    for clause in required(value)?.split(',') {
                        let (when, action) = clause
                            .split_once(':')
                            .ok_or_else(|| ExtractError::malformed(item, "expected OnX:ACTION"))?;
                        let action = action.parse::<ReferentialAction>()?;
                        match when.trim().to_ascii_lowercase().as_str() {
                            "onupdate" => on_update = Some(action),
                            "ondelete" => on_delete = Some(action),
                            _ => return Err(ExtractError::malformed(item, "unknown constraint")),
                        }
                    }
                }
                _ => return Err(ExtractError::malformed(item, "unknown attribute")),
            }
        }

        match foreign_key {
            Some(foreign_key) => attrs.push(ColumnAttr::Relation(Relation {
                foreign_key,
                references,
                on_update,
                on_delete,
            })),
            None if references.is_some() || on_update.is_some() || on_delete.is_some() => {
                return Err(ExtractError::malformed(tag, "relationship without foreignKey"));
            }
            None => {}
        }

        Ok(attrs)
    }
}

/// One field of a model definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub ident: &'static str,
    pub kind: FieldKind,
    /// Non-exported fields never map to columns.
    pub exported: bool,
    /// Embedded (anonymous) fields never map to columns.
    pub embedded: bool,
    pub attrs: Vec<ColumnAttr>,
}

impl FieldSpec {
    pub fn new(ident: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            ident,
            kind,
            exported: true,
            embedded: false,
            attrs: Vec::new(),
        }
    }

    pub fn attr(mut self, attr: ColumnAttr) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Append the attributes of a tag-style list.
    pub fn tagged(mut self, tag: &str) -> Result<Self, ExtractError> {
        self.attrs.extend(ColumnAttr::parse_list(tag)?);
        Ok(self)
    }

    pub fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn has(&self, attr: &ColumnAttr) -> bool {
        self.attrs.contains(attr)
    }

    pub fn relation(&self) -> Option<&Relation> {
        self.attrs.iter().find_map(|a| match a {
            ColumnAttr::Relation(r) => Some(r),
            _ => None,
        })
    }

    pub fn column_override(&self) -> Option<&str> {
        self.attrs.iter().find_map(|a| match a {
            ColumnAttr::Column(c) => Some(c.as_str()),
            _ => None,
        })
    }

    pub fn type_override(&self) -> Option<&str> {
        self.attrs.iter().find_map(|a| match a {
            ColumnAttr::Type(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn default_value(&self) -> Option<&str> {
        self.attrs.iter().find_map(|a| match a {
            ColumnAttr::Default(d) => Some(d.as_str()),
            _ => None,
        })
    }
}

/// Ordered field table of one persisted entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    pub type_name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ModelDef {
    pub fn new(type_name: &'static str) -> Self {
        ModelDef {
            type_name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// Implemented by every persisted entity.
pub trait Model {
    fn definition() -> ModelDef;

    fn table_name() -> String {
        crate::naming::table_name(Self::definition().type_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

/// Column-level view of one field, derived by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub column: String,
    pub sql_type: String,
    pub nullable: bool,
    pub unique: bool,
    pub indexed: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub table: String,
    pub entity: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn field(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }
}
