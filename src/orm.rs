//! Minimal async ORM layer (sqlite + sqlx)
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! db.execute("CREATE TABLE ...").await?;
//! db.fetch_all("SELECT ...").await?
//!
//! Besides raw execution, `Db` synthesises the DDL for model descriptors
//! (create table, add column, create index) and answers the schema
//! questions the migrator asks through [`SchemaInspector`].
use std::str::FromStr;

use async_trait::async_trait;
use log::{debug, info};
pub use sqlx::FromRow;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, SqlitePool};
use thiserror::Error;

use crate::naming;
use crate::schema::{FieldDescriptor, ModelDescriptor};

#[derive(Debug, Error)]
pub enum OrmError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// An async database pool wrapper.
#[derive(Clone, Debug)]
pub struct Db {
    pool: SqlitePool,
}

/// Capability queries against the live schema.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    async fn has_table(&self, table: &str) -> Result<bool, OrmError>;

    /// Declared type of a column, `None` when the column does not exist.
    async fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, OrmError>;

    async fn has_index(&self, index: &str) -> Result<bool, OrmError>;

    async fn has_column(&self, table: &str, column: &str) -> Result<bool, OrmError> {
        Ok(self.column_type(table, column).await?.is_some())
    }
}

impl Db {
    /// Connect (or create) a SQLite database at the given URI.
    ///
    /// In-memory databases are pinned to a single long-lived connection so
    /// every caller sees the same schema.
    pub async fn connect(uri: &str) -> Result<Self, OrmError> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if uri.contains(":memory:") || uri.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Execute an arbitrary SQL statement, e.g. DDL, INSERT, UPDATE.
    pub async fn execute(&self, sql: &str) -> Result<(), OrmError> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        match &result {
            Ok(_) => debug!("SQL executed successfully"),
            Err(e) => log::error!("SQL execution failed: {}", e),
        }
        result.map(|_| ()).map_err(OrmError::from)
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> Result<Vec<T>, OrmError> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as(sql).fetch_all(&self.pool).await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows successfully", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result.map_err(OrmError::from)
    }

    /// Create a model's table and its indexes.
    pub async fn create_table(&self, model: &ModelDescriptor) -> Result<(), OrmError> {
        for statement in create_table_statements(model) {
            self.execute(&statement).await?;
        }
        info!(
            "Migrated `{}` (table created, initial schema applied).",
            model.table
        );
        Ok(())
    }
}

#[async_trait]
impl SchemaInspector for Db {
    async fn has_table(&self, table: &str) -> Result<bool, OrmError> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, OrmError> {
        let pragma_sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let found = sqlx::query(&pragma_sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row: SqliteRow| (row.get::<String, _>("name"), row.get::<String, _>("type")))
            .find(|(name, _)| name == column)
            .map(|(_, sqltype)| sqltype);
        Ok(found)
    }

    async fn has_index(&self, index: &str) -> Result<bool, OrmError> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'index' AND name = $1")
            .bind(index)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

/// Column clause used inside `CREATE TABLE`.
pub fn column_definition(field: &FieldDescriptor) -> String {
    let mut sql = format!("{} {}", field.column, field.sql_type);
    if field.primary_key {
        sql.push_str(" PRIMARY KEY");
        if field.auto_increment {
            sql.push_str(" AUTOINCREMENT");
        }
    } else if !field.nullable {
        sql.push_str(" NOT NULL");
    }
    if field.unique && !field.indexed && !field.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        sql.push_str(&format!(" DEFAULT {default}"));
    }
    if let Some(fk) = &field.foreign_key {
        sql.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        if let Some(action) = fk.on_update {
            sql.push_str(&format!(" ON UPDATE {action}"));
        }
        if let Some(action) = fk.on_delete {
            sql.push_str(&format!(" ON DELETE {action}"));
        }
    }
    sql
}

pub fn create_table_sql(model: &ModelDescriptor) -> String {
    let columns: Vec<String> = model
        .fields
        .iter()
        .map(|f| format!("    {}", column_definition(f)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        model.table,
        columns.join(",\n")
    )
}

/// `CREATE TABLE` followed by one statement per indexed column.
pub fn create_table_statements(model: &ModelDescriptor) -> Vec<String> {
    let mut statements = vec![create_table_sql(model)];
    statements.extend(
        model
            .fields
            .iter()
            .filter_map(|f| create_index_sql(&model.table, f)),
    );
    statements
}

pub fn create_index_sql(table: &str, field: &FieldDescriptor) -> Option<String> {
    if !field.indexed {
        return None;
    }
    let unique = if field.unique { "UNIQUE " } else { "" };
    Some(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        unique,
        naming::index_name(table, &field.column),
        table,
        field.column
    ))
}

/// Statements adding `field` to an existing table.
///
/// SQLite cannot add a PRIMARY KEY or UNIQUE column in place and rejects a
/// NOT NULL column without a default, so uniqueness moves into an index and
/// the column gets a zero value default. Unique and foreign key columns
/// without an explicit default are added nullable instead: existing rows
/// would all share the zero value, and a REFERENCES column must default to
/// NULL while foreign keys are enforced.
pub fn add_column_statements(table: &str, field: &FieldDescriptor) -> Vec<String> {
    let mut column = FieldDescriptor {
        primary_key: false,
        auto_increment: false,
        ..field.clone()
    };
    if !column.nullable && column.default.is_none() {
        if column.unique || column.foreign_key.is_some() {
            column.nullable = true;
        } else {
            column.default = Some(zero_value(&column.sql_type).to_string());
        }
    }
    let standalone_unique = column.unique && !column.indexed;
    column.unique = column.unique && column.indexed;

    let mut statements = vec![format!(
        "ALTER TABLE {} ADD COLUMN {}",
        table,
        column_definition(&column)
    )];
    if let Some(index) = create_index_sql(table, &column) {
        statements.push(index);
    }
    if standalone_unique {
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS uniq_{}_{} ON {} ({})",
            table, column.column, table, column.column
        ));
    }
    statements
}

fn zero_value(sql_type: &str) -> &'static str {
    let ty = sql_type.to_ascii_uppercase();
    if ty.contains("INT") || ty.contains("REAL") || ty.contains("DOUB") || ty.contains("BOOL") {
        "0"
    } else if ty.contains("TIME") || ty.contains("DATE") {
        "'1970-01-01 00:00:00'"
    } else {
        "''"
    }
}
