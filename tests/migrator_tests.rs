mod common;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use ironplate::migrator::{
    MigrationOperation, Migrator, OperationKind, SchemaDiffer, render_plan,
};
use ironplate::models::{self, Registry, User};
use ironplate::orm::{OrmError, SchemaInspector, create_table_sql};
use ironplate::schema::{ColumnAttr, FieldKind, FieldSpec, Model, ModelDef};

struct Gadget;

impl Model for Gadget {
    fn definition() -> ModelDef {
        ModelDef::new("Gadget")
            .field(
                FieldSpec::new("ID", FieldKind::I64)
                    .attr(ColumnAttr::PrimaryKey)
                    .attr(ColumnAttr::AutoIncrement),
            )
            .field(FieldSpec::new("Label", FieldKind::Varchar(40)).attr(ColumnAttr::Index))
    }
}

#[tokio::test]
async fn test_empty_database_creates_every_table() {
    let db = common::memory_db().await;
    let migrator = Migrator::new(db.clone(), &models::registry()).unwrap();

    let plan = migrator.detect_changes().await.unwrap();
    let kinds: Vec<(OperationKind, &str)> =
        plan.iter().map(|op| (op.kind, op.table.as_str())).collect();
    assert_eq!(
        kinds,
        vec![
            (OperationKind::CreateTable, "users"),
            (OperationKind::CreateTable, "logs")
        ]
    );

    let report = migrator.migrate().await.unwrap();
    assert_eq!(report.operations.len(), 2);
    assert_eq!(report.record.name.len(), 20);

    assert!(db.has_table("users").await.unwrap());
    assert!(db.has_table("logs").await.unwrap());
    assert!(db.has_table("migrations").await.unwrap());
    assert!(db.has_index("idx_users_email").await.unwrap());
    assert!(db.has_index("idx_logs_status_code").await.unwrap());
}

#[tokio::test]
async fn test_second_pass_finds_nothing() {
    let db = common::memory_db().await;
    let migrator = Migrator::new(db.clone(), &models::registry()).unwrap();
    migrator.migrate().await.unwrap();

    assert!(migrator.detect_changes().await.unwrap().is_empty());

    // Startup passes always leave a marker, manual runs only when work was done.
    migrator.migrate().await.unwrap();
    assert!(migrator.run().await.unwrap().is_empty());
    let history = migrator.executor().history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].name, history[1].name);
}

#[tokio::test]
async fn test_missing_columns_are_added() {
    let db = common::memory_db().await;
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT NOT NULL)")
        .await
        .unwrap();
    db.execute("INSERT INTO users (email) VALUES ('old@example.com')")
        .await
        .unwrap();

    let registry = Registry::new().register::<User>();
    let migrator = Migrator::new(db.clone(), &registry).unwrap();
    let plan = migrator.detect_changes().await.unwrap();

    let added: Vec<&str> = plan
        .iter()
        .filter(|op| op.kind == OperationKind::AddColumn)
        .filter_map(|op| op.column.as_ref().map(|c| c.column.as_str()))
        .collect();
    assert_eq!(
        added,
        vec![
            "password",
            "name",
            "user_type",
            "is_active",
            "created_at",
            "updated_at",
            "deleted_at"
        ]
    );
    let indexes: Vec<&MigrationOperation> = plan
        .iter()
        .filter(|op| op.kind == OperationKind::AddIndex)
        .collect();
    assert_eq!(indexes.len(), 1);
    assert_eq!(
        indexes[0].statements,
        vec!["CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)".to_string()]
    );

    let ran = migrator.run().await.unwrap();
    assert_eq!(ran.len(), 8);
    assert!(migrator.detect_changes().await.unwrap().is_empty());
    assert!(db.has_column("users", "deleted_at").await.unwrap());
    assert!(db.has_index("idx_users_is_active").await.unwrap());

    let rows: Vec<(String,)> = db.fetch_all("SELECT email FROM users").await.unwrap();
    assert_eq!(rows, vec![("old@example.com".to_string(),)]);
}

#[tokio::test]
async fn test_type_drift_is_reported_not_applied() {
    let db = common::memory_db().await;
    db.execute("CREATE TABLE gadgets (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL)")
        .await
        .unwrap();
    db.execute("CREATE INDEX idx_gadgets_label ON gadgets (label)")
        .await
        .unwrap();

    let migrator = Migrator::new(db.clone(), &Registry::new().register::<Gadget>()).unwrap();
    let plan = migrator.detect_changes().await.unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].kind, OperationKind::ModifyColumn);
    assert!(plan[0].sql().is_none());

    migrator.run().await.unwrap();
    assert_eq!(
        db.column_type("gadgets", "label").await.unwrap().as_deref(),
        Some("TEXT")
    );
    assert_eq!(migrator.detect_changes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_index_is_created() {
    let db = common::memory_db().await;
    db.execute(
        "CREATE TABLE gadgets (id INTEGER PRIMARY KEY AUTOINCREMENT, label varchar(40) NOT NULL)",
    )
    .await
    .unwrap();

    let migrator = Migrator::new(db.clone(), &Registry::new().register::<Gadget>()).unwrap();
    let plan = migrator.detect_changes().await.unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].kind, OperationKind::AddIndex);
    assert_eq!(
        plan[0].sql().unwrap(),
        "CREATE INDEX IF NOT EXISTS idx_gadgets_label ON gadgets (label)"
    );

    migrator.run().await.unwrap();
    assert!(db.has_index("idx_gadgets_label").await.unwrap());
    assert!(migrator.detect_changes().await.unwrap().is_empty());
}

#[test]
fn test_foreign_key_ddl() {
    let models = models::registry().describe().unwrap();
    let sql = create_table_sql(&models[1]);
    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS logs ("));
    assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert!(sql.contains("user_id BIGINT REFERENCES users(id) ON UPDATE CASCADE ON DELETE SET NULL"));
    assert!(sql.contains("method VARCHAR(10) NOT NULL"));
}

#[tokio::test]
async fn test_write_plan() {
    let dir = tempfile::tempdir().unwrap();
    let db = common::memory_db().await;
    let migrator = Migrator::new(db.clone(), &models::registry()).unwrap();

    let path = dir.path().join("pending.sql");
    assert_eq!(migrator.write_plan(&path).await.unwrap(), 2);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("-- Migration generated on "));
    assert!(content.contains("-- [1] Create table `users`"));
    assert!(content.contains("-- [2] Create table `logs`"));
    assert!(content.contains("CREATE TABLE IF NOT EXISTS users ("));

    // Writing a plan applies nothing.
    assert!(!db.has_table("users").await.unwrap());

    migrator.migrate().await.unwrap();
    let empty = dir.path().join("empty.sql");
    assert_eq!(migrator.write_plan(&empty).await.unwrap(), 0);
    assert!(!empty.exists());
}

#[test]
fn test_render_plan_reported_only_step() {
    let models = Registry::new().register::<Gadget>().describe().unwrap();
    let label = models[0].field("label").unwrap();
    let operations = vec![
        MigrationOperation::modify_column("gadgets", label, "TEXT"),
        MigrationOperation::add_index("gadgets", label),
    ];
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    let plan = render_plan(&operations, at);
    assert_eq!(
        plan,
        "-- Migration generated on 2024-05-01 12:30:00\n\
         -- [1] Column `gadgets.label` is TEXT in the database but VARCHAR(40) in the model (not applied)\n\
         -- (no SQL generated)\n\n\
         -- [2] Create index `idx_gadgets_label`\n\
         CREATE INDEX IF NOT EXISTS idx_gadgets_label ON gadgets (label);\n\n"
    );
}

/// Inspector for a database with no tables at all.
struct EmptyInspector;

#[async_trait]
impl SchemaInspector for EmptyInspector {
    async fn has_table(&self, _table: &str) -> Result<bool, OrmError> {
        Ok(false)
    }

    async fn column_type(&self, _table: &str, _column: &str) -> Result<Option<String>, OrmError> {
        Ok(None)
    }

    async fn has_index(&self, _index: &str) -> Result<bool, OrmError> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_differ_against_custom_inspector() {
    let models = models::registry().describe().unwrap();
    let plan = SchemaDiffer::new(&EmptyInspector).diff(&models).await.unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.iter().all(|op| op.kind == OperationKind::CreateTable));
    assert!(plan[0].statements.len() > 1);
}
