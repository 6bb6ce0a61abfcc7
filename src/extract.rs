//! Derivation of column descriptors from model definitions.
//!
//! Extraction runs in two passes. [`extract_fields`] maps every scalar field
//! to a [`FieldDescriptor`]; [`resolve_foreign_keys`] then walks the
//! association fields and attaches the referenced table to the descriptor of
//! the key column. Both passes are pure.

use log::debug;
use thiserror::Error;

use crate::naming;
use crate::schema::{
    ColumnAttr, FieldDescriptor, FieldKind, FieldSpec, ForeignKey, ModelDef, ModelDescriptor,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("malformed column attribute `{tag}`: {reason}")]
    MalformedTag { tag: String, reason: String },
    #[error("{model}.{field} is a struct without a relation or an explicit column type")]
    AmbiguousStructField { model: String, field: String },
    #[error("{model}.{field} references foreign key column `{column}` which is not defined")]
    MissingForeignKeyColumn {
        model: String,
        field: String,
        column: String,
    },
    #[error("{model} maps more than one field to column `{column}`")]
    DuplicateColumn { model: String, column: String },
}

impl ExtractError {
    pub(crate) fn malformed(tag: &str, reason: &str) -> Self {
        ExtractError::MalformedTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Build the full descriptor of a model.
pub fn describe(def: &ModelDef) -> Result<ModelDescriptor, ExtractError> {
    let fields = extract_fields(def)?;
    let fields = resolve_foreign_keys(def, fields)?;
    let table = naming::table_name(def.type_name);
    debug!(
        "Described model {} as table `{}` with {} columns",
        def.type_name,
        table,
        fields.len()
    );
    Ok(ModelDescriptor {
        table,
        entity: def.type_name,
        fields,
    })
}

/// A field is an association when it holds another model and says how it
/// relates to it. Struct fields with an explicit column type are stored as
/// plain columns; anything else is rejected rather than silently dropped.
pub fn is_association(model: &ModelDef, field: &FieldSpec) -> Result<bool, ExtractError> {
    if !field.kind.is_struct() {
        return Ok(false);
    }
    if field.relation().is_some() {
        return Ok(true);
    }
    if field.type_override().is_some() {
        return Ok(false);
    }
    Err(ExtractError::AmbiguousStructField {
        model: model.type_name.to_string(),
        field: field.ident.to_string(),
    })
}

/// First pass: one descriptor per column-backed field, in declaration order.
pub fn extract_fields(def: &ModelDef) -> Result<Vec<FieldDescriptor>, ExtractError> {
    let mut fields: Vec<FieldDescriptor> = Vec::new();

    for spec in &def.fields {
        if !spec.exported || spec.embedded || spec.has(&ColumnAttr::Ignore) {
            continue;
        }
        if is_association(def, spec)? {
            continue;
        }

        let descriptor = describe_field(spec);
        if fields.iter().any(|f| f.column == descriptor.column) {
            return Err(ExtractError::DuplicateColumn {
                model: def.type_name.to_string(),
                column: descriptor.column,
            });
        }
        fields.push(descriptor);
    }

    Ok(fields)
}

fn describe_field(spec: &FieldSpec) -> FieldDescriptor {
    let column = spec
        .column_override()
        .map(str::to_string)
        .unwrap_or_else(|| naming::column_name(spec.ident));

    let primary_key = spec.has(&ColumnAttr::PrimaryKey);
    let auto_increment = spec.has(&ColumnAttr::AutoIncrement);
    let unique_index = spec.has(&ColumnAttr::UniqueIndex);

    // SQLite only aliases the rowid for a column declared exactly INTEGER.
    let sql_type = match spec.type_override() {
        Some(explicit) => explicit.to_string(),
        None if primary_key && auto_increment => "INTEGER".to_string(),
        None => sql_type_for(spec.kind.base()).unwrap_or_else(|| "TEXT".to_string()),
    };

    let nullable = !primary_key && !spec.has(&ColumnAttr::NotNull) && spec.kind.is_optional();

    FieldDescriptor {
        column,
        sql_type,
        nullable,
        unique: unique_index || spec.has(&ColumnAttr::Unique),
        indexed: !primary_key && (unique_index || spec.has(&ColumnAttr::Index)),
        primary_key,
        auto_increment,
        default: spec.default_value().map(str::to_string),
        foreign_key: None,
    }
}

/// SQL type of a scalar kind. Unsigned widths widen to BIGINT so the full
/// range fits.
pub fn sql_type_for(kind: &FieldKind) -> Option<String> {
    let ty = match kind {
        FieldKind::String => "TEXT".to_string(),
        FieldKind::Varchar(n) => format!("VARCHAR({n})"),
        FieldKind::I8 | FieldKind::I16 | FieldKind::I32 => "INTEGER".to_string(),
        FieldKind::I64 => "BIGINT".to_string(),
        FieldKind::U8 | FieldKind::U16 | FieldKind::U32 | FieldKind::U64 => "BIGINT".to_string(),
        FieldKind::F32 => "REAL".to_string(),
        FieldKind::F64 => "DOUBLE PRECISION".to_string(),
        FieldKind::Bool => "BOOLEAN".to_string(),
        FieldKind::Timestamp => "TIMESTAMP".to_string(),
        FieldKind::Optional(inner) => return sql_type_for(inner),
        FieldKind::Struct(_) => return None,
    };
    Some(ty)
}

/// Second pass: attach foreign key targets declared by association fields.
pub fn resolve_foreign_keys(
    def: &ModelDef,
    mut fields: Vec<FieldDescriptor>,
) -> Result<Vec<FieldDescriptor>, ExtractError> {
    for spec in &def.fields {
        if !spec.exported || spec.embedded || spec.has(&ColumnAttr::Ignore) {
            continue;
        }
        let (Some(relation), FieldKind::Struct(target)) = (spec.relation(), spec.kind.base())
        else {
            continue;
        };

        let key_column = naming::column_name(&relation.foreign_key);
        let Some(descriptor) = fields.iter_mut().find(|f| f.column == key_column) else {
            return Err(ExtractError::MissingForeignKeyColumn {
                model: def.type_name.to_string(),
                field: spec.ident.to_string(),
                column: key_column,
            });
        };

        descriptor.foreign_key = Some(ForeignKey {
            table: naming::table_name(target),
            column: relation
                .references
                .as_deref()
                .map(naming::column_name)
                .unwrap_or_else(|| "id".to_string()),
            on_update: relation.on_update,
            on_delete: relation.on_delete,
        });
    }

    Ok(fields)
}
