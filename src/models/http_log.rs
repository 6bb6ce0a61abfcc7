use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::orm::{Db, OrmError};
use crate::schema::{ColumnAttr, FieldKind, FieldSpec, Model, ModelDef, ReferentialAction, Relation};

/// A persisted HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Log {
    pub id: i64,
    pub user_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub request_body: String,
    pub response_body: String,
    pub request_headers: String,
    pub response_headers: String,
    pub status_code: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A request/response pair queued for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub user_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub request_body: String,
    pub response_body: String,
    pub request_headers: String,
    pub response_headers: String,
    pub status_code: i32,
    pub created_at: DateTime<Utc>,
}

impl Model for Log {
    fn definition() -> ModelDef {
        ModelDef::new("Log")
            .field(
                FieldSpec::new("ID", FieldKind::I64)
                    .attr(ColumnAttr::PrimaryKey)
                    .attr(ColumnAttr::AutoIncrement),
            )
            .field(FieldSpec::new("UserID", FieldKind::optional(FieldKind::I64)).attr(ColumnAttr::Index))
            .field(
                FieldSpec::new("User", FieldKind::optional(FieldKind::Struct("User"))).attr(
                    ColumnAttr::Relation(
                        Relation::new("UserID")
                            .on_update(ReferentialAction::Cascade)
                            .on_delete(ReferentialAction::SetNull),
                    ),
                ),
            )
            .field(FieldSpec::new("Method", FieldKind::Varchar(10)).attr(ColumnAttr::Index))
            .field(FieldSpec::new("URL", FieldKind::String))
            .field(FieldSpec::new("RequestBody", FieldKind::String))
            .field(FieldSpec::new("ResponseBody", FieldKind::String))
            .field(FieldSpec::new("RequestHeaders", FieldKind::String))
            .field(FieldSpec::new("ResponseHeaders", FieldKind::String))
            .field(FieldSpec::new("StatusCode", FieldKind::I32).attr(ColumnAttr::Index))
            .field(FieldSpec::new("CreatedAt", FieldKind::Timestamp).attr(ColumnAttr::Index))
            .field(FieldSpec::new("UpdatedAt", FieldKind::Timestamp))
            .field(
                FieldSpec::new("DeletedAt", FieldKind::optional(FieldKind::Timestamp))
                    .attr(ColumnAttr::Index),
            )
    }
}

impl Log {
    pub async fn insert(db: &Db, entry: &LogEntry) -> Result<i64, OrmError> {
        let result = sqlx::query(
            "INSERT INTO logs (user_id, method, url, request_body, response_body, \
             request_headers, response_headers, status_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.user_id)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(&entry.request_body)
        .bind(&entry.response_body)
        .bind(&entry.request_headers)
        .bind(&entry.response_headers)
        .bind(entry.status_code)
        .bind(entry.created_at)
        .bind(entry.created_at)
        .execute(db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first.
    pub async fn recent(db: &Db, limit: i64) -> Result<Vec<Log>, OrmError> {
        let logs = sqlx::query_as::<_, Log>(
            "SELECT id, user_id, method, url, request_body, response_body, request_headers, \
             response_headers, status_code, created_at, updated_at, deleted_at \
             FROM logs WHERE deleted_at IS NULL ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(db.pool())
        .await?;
        Ok(logs)
    }
}
