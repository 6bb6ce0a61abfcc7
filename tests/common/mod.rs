#![allow(dead_code)]

use std::sync::Arc;

use ironplate::migrator::Migrator;
use ironplate::models;
use ironplate::orm::Db;
use ironplate::router::{AppState, RequestContext};
use ironplate::settings::Settings;

pub const SECRET: &str = "test-secret";

pub fn settings() -> Settings {
    Settings::from_lookup(|key| match key {
        "JWT_SECRET" => Some(SECRET.to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        "FRONTEND_URL" => Some("http://localhost:3000".to_string()),
        "DATABASE_URL" => Some("sqlite::memory:".to_string()),
        _ => None,
    })
    .unwrap()
}

pub async fn memory_db() -> Arc<Db> {
    Arc::new(Db::connect("sqlite::memory:").await.unwrap())
}

/// In-memory database with every registered model migrated.
pub async fn migrated_db() -> Arc<Db> {
    let db = memory_db().await;
    Migrator::new(db.clone(), &models::registry())
        .unwrap()
        .migrate()
        .await
        .unwrap();
    db
}

pub async fn app_state() -> AppState {
    AppState::new(migrated_db().await, settings())
}

pub fn post_json(path: &str, body: serde_json::Value) -> RequestContext {
    RequestContext::new("POST", path)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string())
}
