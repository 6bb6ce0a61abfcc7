//! Descriptor-driven schema migrations.
//!
//! [`SchemaDiffer`] compares the registered model descriptors against the
//! live database and produces an ordered list of [`MigrationOperation`]s.
//! [`MigrationExecutor`] applies them through the ORM layer and appends a
//! [`MigrationRecord`] to the `migrations` audit table.
//!
//! The diff is additive: tables, columns and indexes are created when
//! missing, type drift is reported but never altered, nothing is dropped.
//! Operations are not wrapped in a transaction.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

use crate::extract::{self, ExtractError};
use crate::models::Registry;
use crate::naming;
use crate::orm::{self, Db, OrmError, SchemaInspector};
use crate::schema::{
    ColumnAttr, FieldDescriptor, FieldKind, FieldSpec, Model, ModelDef, ModelDescriptor,
};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Orm(#[from] OrmError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("migrations table creation failed: {0}")]
    AuditTable(#[source] OrmError),
    #[error("failed to write migration plan to {}: {source}", path.display())]
    WritePlan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateTable,
    AddColumn,
    /// Live column type differs from the model. Reported only.
    ModifyColumn,
    AddIndex,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::CreateTable => "create_table",
            OperationKind::AddColumn => "add_column",
            OperationKind::ModifyColumn => "modify_column",
            OperationKind::AddIndex => "add_index",
        };
        f.write_str(name)
    }
}

/// One step of a migration plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOperation {
    pub kind: OperationKind,
    pub table: String,
    pub column: Option<FieldDescriptor>,
    pub description: String,
    /// DDL statements in execution order; empty for reported-only steps.
    pub statements: Vec<String>,
}

impl MigrationOperation {
    pub fn create_table(model: &ModelDescriptor) -> Self {
        MigrationOperation {
            kind: OperationKind::CreateTable,
            table: model.table.clone(),
            column: None,
            description: format!(
                "Create table `{}` for {} ({} columns)",
                model.table,
                model.entity,
                model.fields.len()
            ),
            statements: orm::create_table_statements(model),
        }
    }

    pub fn add_column(table: &str, field: &FieldDescriptor) -> Self {
        MigrationOperation {
            kind: OperationKind::AddColumn,
            table: table.to_string(),
            column: Some(field.clone()),
            description: format!("Add column `{}.{}` {}", table, field.column, field.sql_type),
            statements: orm::add_column_statements(table, field),
        }
    }

    pub fn modify_column(table: &str, field: &FieldDescriptor, live_type: &str) -> Self {
        MigrationOperation {
            kind: OperationKind::ModifyColumn,
            table: table.to_string(),
            column: Some(field.clone()),
            description: format!(
                "Column `{}.{}` is {} in the database but {} in the model (not applied)",
                table, field.column, live_type, field.sql_type
            ),
            statements: Vec::new(),
        }
    }

    pub fn add_index(table: &str, field: &FieldDescriptor) -> Self {
        MigrationOperation {
            kind: OperationKind::AddIndex,
            table: table.to_string(),
            column: Some(field.clone()),
            description: format!(
                "Create index `{}`",
                naming::index_name(table, &field.column)
            ),
            statements: orm::create_index_sql(table, field).into_iter().collect(),
        }
    }

    /// Generated SQL, `None` for reported-only operations.
    pub fn sql(&self) -> Option<String> {
        if self.statements.is_empty() {
            None
        } else {
            Some(self.statements.join(";\n"))
        }
    }
}

/// Row of the `migrations` audit table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Model for MigrationRecord {
    fn definition() -> ModelDef {
        ModelDef::new("MigrationRecord")
            .field(
                FieldSpec::new("ID", FieldKind::I64)
                    .attr(ColumnAttr::PrimaryKey)
                    .attr(ColumnAttr::AutoIncrement),
            )
            .field(FieldSpec::new("Name", FieldKind::String).attr(ColumnAttr::UniqueIndex))
            .field(FieldSpec::new("CreatedAt", FieldKind::Timestamp))
    }
}

pub struct SchemaDiffer<'a> {
    inspector: &'a dyn SchemaInspector,
}

impl<'a> SchemaDiffer<'a> {
    pub fn new(inspector: &'a dyn SchemaInspector) -> Self {
        SchemaDiffer { inspector }
    }

    /// Operations needed to bring the database up to `models`, in registry
    /// order with each table before its columns and indexes.
    pub async fn diff(
        &self,
        models: &[ModelDescriptor],
    ) -> Result<Vec<MigrationOperation>, OrmError> {
        let mut operations = Vec::new();

        for model in models {
            if !self.inspector.has_table(&model.table).await? {
                debug!("Table `{}` is missing", model.table);
                operations.push(MigrationOperation::create_table(model));
                continue;
            }

            let mut added: Vec<&str> = Vec::new();
            for field in &model.fields {
                match self.inspector.column_type(&model.table, &field.column).await? {
                    None => {
                        operations.push(MigrationOperation::add_column(&model.table, field));
                        added.push(&field.column);
                    }
                    Some(live) if !same_type(&live, &field.sql_type) => {
                        operations.push(MigrationOperation::modify_column(
                            &model.table,
                            field,
                            &live,
                        ));
                    }
                    Some(_) => {}
                }
            }

            // Indexes of freshly added columns are part of the add_column step.
            for field in model.fields.iter().filter(|f| f.indexed) {
                if added.contains(&field.column.as_str()) {
                    continue;
                }
                let index = naming::index_name(&model.table, &field.column);
                if !self.inspector.has_index(&index).await? {
                    operations.push(MigrationOperation::add_index(&model.table, field));
                }
            }
        }

        Ok(operations)
    }
}

fn same_type(live: &str, declared: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    normalize(live) == normalize(declared)
}

pub struct MigrationExecutor {
    db: Arc<Db>,
}

impl MigrationExecutor {
    pub fn new(db: Arc<Db>) -> Self {
        MigrationExecutor { db }
    }

    pub async fn ensure_audit_table(&self) -> Result<(), MigrationError> {
        let audit = extract::describe(&MigrationRecord::definition())?;
        let exists = self
            .db
            .has_table(&audit.table)
            .await
            .map_err(MigrationError::AuditTable)?;
        if !exists {
            self.db
                .create_table(&audit)
                .await
                .map_err(MigrationError::AuditTable)?;
        }
        Ok(())
    }

    pub async fn apply(&self, operation: &MigrationOperation) -> Result<(), MigrationError> {
        if operation.kind == OperationKind::ModifyColumn {
            warn!("Skipping: {}", operation.description);
            return Ok(());
        }
        for statement in &operation.statements {
            self.db.execute(statement).await?;
        }
        info!("Applied: {}", operation.description);
        Ok(())
    }

    /// Apply `operations` in order and record the pass. Stops at the first
    /// failure; statements already applied stay applied.
    pub async fn execute(
        &self,
        operations: &[MigrationOperation],
    ) -> Result<MigrationRecord, MigrationError> {
        self.ensure_audit_table().await?;
        for (i, operation) in operations.iter().enumerate() {
            debug!(" [{}] {}", i + 1, operation.description);
            self.apply(operation).await?;
        }
        let record = self.record().await?;
        info!("Migrations executed successfully ({})", record.name);
        Ok(record)
    }

    /// Append a marker row named after the current UTC time.
    pub async fn record(&self) -> Result<MigrationRecord, MigrationError> {
        let created_at = Utc::now();
        let name = created_at.format("%Y%m%d%H%M%S%6f").to_string();
        let result = sqlx::query("INSERT INTO migrations (name, created_at) VALUES ($1, $2)")
            .bind(&name)
            .bind(created_at)
            .execute(self.db.pool())
            .await
            .map_err(OrmError::from)?;
        Ok(MigrationRecord {
            id: result.last_insert_rowid(),
            name,
            created_at,
        })
    }

    pub async fn history(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = self
            .db
            .fetch_all::<MigrationRecord>("SELECT id, name, created_at FROM migrations ORDER BY id")
            .await?;
        Ok(records)
    }
}

/// Outcome of a migration pass.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub operations: Vec<MigrationOperation>,
    pub record: MigrationRecord,
}

/// Registry-bound entry point used at startup and by the `migrate` command.
pub struct Migrator {
    db: Arc<Db>,
    executor: MigrationExecutor,
    models: Vec<ModelDescriptor>,
}

impl Migrator {
    pub fn new(db: Arc<Db>, registry: &Registry) -> Result<Self, MigrationError> {
        let models = registry.describe()?;
        Ok(Migrator {
            executor: MigrationExecutor::new(db.clone()),
            db,
            models,
        })
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn executor(&self) -> &MigrationExecutor {
        &self.executor
    }

    pub async fn detect_changes(&self) -> Result<Vec<MigrationOperation>, MigrationError> {
        let operations = SchemaDiffer::new(self.db.as_ref())
            .diff(&self.models)
            .await?;
        Ok(operations)
    }

    pub async fn execute(
        &self,
        operations: &[MigrationOperation],
    ) -> Result<MigrationRecord, MigrationError> {
        self.executor.execute(operations).await
    }

    /// Startup pass: detect, apply and record, even when nothing changed.
    pub async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        let operations = self.detect_changes().await?;
        let record = self.execute(&operations).await?;
        Ok(MigrationReport { operations, record })
    }

    /// Manual pass: like [`Migrator::migrate`] but records nothing when the
    /// schema is already current.
    pub async fn run(&self) -> Result<Vec<MigrationOperation>, MigrationError> {
        let operations = self.detect_changes().await?;
        if operations.is_empty() {
            info!("✅ No migrations needed - DB is up to date");
            return Ok(operations);
        }
        info!("📋 Migration plan:");
        for (i, operation) in operations.iter().enumerate() {
            info!(" [{}] {}", i + 1, operation.description);
        }
        self.execute(&operations).await?;
        Ok(operations)
    }

    /// Write the pending plan to `path` without applying it. Returns the
    /// number of operations written; no file is created for an empty plan.
    pub async fn write_plan(&self, path: &Path) -> Result<usize, MigrationError> {
        let operations = self.detect_changes().await?;
        if operations.is_empty() {
            info!("No migrations to generate");
            return Ok(0);
        }
        let content = render_plan(&operations, Utc::now());
        tokio::fs::write(path, content)
            .await
            .map_err(|source| MigrationError::WritePlan {
                path: path.to_path_buf(),
                source,
            })?;
        info!("✅ Migration SQL written to: {}", path.display());
        Ok(operations.len())
    }
}

/// Annotated SQL script for manual inspection.
pub fn render_plan(operations: &[MigrationOperation], generated_at: DateTime<Utc>) -> String {
    let mut content = format!(
        "-- Migration generated on {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    for (i, operation) in operations.iter().enumerate() {
        content.push_str(&format!("-- [{}] {}\n", i + 1, operation.description));
        match operation.sql() {
            Some(sql) => content.push_str(&format!("{sql};\n\n")),
            None => content.push_str("-- (no SQL generated)\n\n"),
        }
    }
    content
}
