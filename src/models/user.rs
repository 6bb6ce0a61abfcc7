use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::orm::{Db, OrmError};
use crate::schema::{ColumnAttr, FieldKind, FieldSpec, Model, ModelDef};

/// Account classification, lowest privilege last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    SystemAdmin,
    GarmentsAdmin,
    DepartmentAdmin,
    #[default]
    Employee,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown user type `{0}`")]
pub struct UnknownUserType(pub String);

impl UserType {
    pub const ALL: [UserType; 4] = [
        UserType::SystemAdmin,
        UserType::GarmentsAdmin,
        UserType::DepartmentAdmin,
        UserType::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::SystemAdmin => "system_admin",
            UserType::GarmentsAdmin => "garments_admin",
            UserType::DepartmentAdmin => "department_admin",
            UserType::Employee => "employee",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = UnknownUserType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownUserType(s.to_string()))
    }
}

impl TryFrom<String> for UserType {
    type Error = UnknownUserType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub user_type: UserType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Model for User {
    fn definition() -> ModelDef {
        ModelDef::new("User")
            .field(
                FieldSpec::new("ID", FieldKind::I64)
                    .attr(ColumnAttr::PrimaryKey)
                    .attr(ColumnAttr::AutoIncrement),
            )
            .field(FieldSpec::new("Email", FieldKind::String).attr(ColumnAttr::UniqueIndex))
            .field(FieldSpec::new("Password", FieldKind::String))
            .field(FieldSpec::new("Name", FieldKind::String))
            .field(FieldSpec::new("UserType", FieldKind::Varchar(20)).attr(ColumnAttr::Index))
            .field(
                FieldSpec::new("IsActive", FieldKind::Bool)
                    .attr(ColumnAttr::Default("true".to_string()))
                    .attr(ColumnAttr::Index),
            )
            .field(FieldSpec::new("CreatedAt", FieldKind::Timestamp))
            .field(FieldSpec::new("UpdatedAt", FieldKind::Timestamp))
            .field(
                FieldSpec::new("DeletedAt", FieldKind::optional(FieldKind::Timestamp))
                    .attr(ColumnAttr::Index),
            )
    }
}

const USER_COLUMNS: &str =
    "id, email, password, name, user_type, is_active, created_at, updated_at, deleted_at";

impl User {
    /// Look up a user that has not been soft-deleted.
    pub async fn find_by_email(db: &Db, email: &str) -> Result<Option<User>, OrmError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL LIMIT 1"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db.pool())
            .await?;
        Ok(user)
    }

    pub async fn find(db: &Db, id: i64) -> Result<Option<User>, OrmError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db.pool())
            .await?;
        Ok(user)
    }

    /// Insert a new active user. `password_hash` must already be hashed.
    pub async fn insert(
        db: &Db,
        name: &str,
        email: &str,
        password_hash: &str,
        user_type: UserType,
    ) -> Result<User, OrmError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, password, name, user_type, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(user_type.as_str())
        .bind(true)
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            password: password_hash.to_string(),
            name: name.to_string(),
            user_type,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}
