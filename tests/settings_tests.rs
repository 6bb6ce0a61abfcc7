use std::collections::HashMap;
use std::path::PathBuf;

use ironplate::logging::{DailyFileWriter, default_level};
use ironplate::request_log::OverflowPolicy;
use ironplate::settings::{ConfigError, Settings, is_missing_env_file};
use log::LevelFilter;

fn load(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Settings::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn test_defaults() {
    let settings = load(&[("JWT_SECRET", "s3cret")]).unwrap();
    assert_eq!(settings.environment, "development");
    assert_eq!(settings.address(), "127.0.0.1:8080");
    assert_eq!(settings.database_url, "sqlite://app.db");
    assert_eq!(settings.frontend_url, "http://localhost:3000");
    assert_eq!(settings.bcrypt_cost, 12);
    assert_eq!(settings.log_dir, PathBuf::from("logs"));
    assert_eq!(settings.request_log_capacity, 100);
    assert_eq!(settings.request_log_policy, OverflowPolicy::Block);
    assert!(!settings.is_production());
}

#[test]
fn test_jwt_secret_required() {
    assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    assert_eq!(
        load(&[("JWT_SECRET", "  ")]).unwrap_err(),
        ConfigError::Missing("JWT_SECRET")
    );
}

#[test]
fn test_overrides() {
    let settings = load(&[
        ("JWT_SECRET", "s3cret"),
        ("APP_HOST", "0.0.0.0"),
        ("APP_PORT", "3000"),
        ("DB_NAME", "garments"),
        ("FRONTEND_URL", "https://app.example.com"),
        ("BCRYPT_COST", "10"),
        ("LOG_DIR", "/var/log/ironplate"),
        ("REQUEST_LOG_CAPACITY", "500"),
        ("REQUEST_LOG_OVERFLOW", "reject"),
    ])
    .unwrap();
    assert_eq!(settings.address(), "0.0.0.0:3000");
    assert_eq!(settings.database_url, "sqlite://garments.db");
    assert_eq!(settings.frontend_url, "https://app.example.com");
    assert_eq!(settings.bcrypt_cost, 10);
    assert_eq!(settings.log_dir, PathBuf::from("/var/log/ironplate"));
    assert_eq!(settings.request_log_capacity, 500);
    assert_eq!(settings.request_log_policy, OverflowPolicy::Reject);
}

#[test]
fn test_database_url_wins_over_db_name() {
    let settings = load(&[
        ("JWT_SECRET", "s3cret"),
        ("DB_NAME", "ignored"),
        ("DATABASE_URL", "sqlite::memory:"),
        ("DB_HOST", "db.internal"),
    ])
    .unwrap();
    assert_eq!(settings.database_url, "sqlite::memory:");
}

#[test]
fn test_environment_fallback() {
    let settings = load(&[("JWT_SECRET", "s"), ("GO_ENV", "production")]).unwrap();
    assert!(settings.is_production());
    assert_eq!(default_level(&settings), LevelFilter::Info);

    let settings = load(&[
        ("JWT_SECRET", "s"),
        ("APP_ENV", "staging"),
        ("GO_ENV", "production"),
    ])
    .unwrap();
    assert_eq!(settings.environment, "staging");
    assert_eq!(default_level(&settings), LevelFilter::Debug);
}

#[test]
fn test_invalid_numbers() {
    assert_eq!(
        load(&[("JWT_SECRET", "s"), ("APP_PORT", "eighty")]).unwrap_err(),
        ConfigError::Invalid {
            key: "APP_PORT",
            value: "eighty".to_string()
        }
    );
    assert!(matches!(
        load(&[("JWT_SECRET", "s"), ("BCRYPT_COST", "2")]),
        Err(ConfigError::Invalid { key: "BCRYPT_COST", .. })
    ));
    assert!(matches!(
        load(&[("JWT_SECRET", "s"), ("REQUEST_LOG_OVERFLOW", "drop")]),
        Err(ConfigError::Invalid { key: "REQUEST_LOG_OVERFLOW", .. })
    ));
}

#[test]
fn test_missing_env_file_is_not_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = dotenv::from_path(dir.path().join("absent.env")).unwrap_err();
    assert!(is_missing_env_file(&err));
    assert!(!is_missing_env_file(&dotenv::Error::LineParse("KEY".to_string(), 3)));
}

#[test]
fn test_daily_file_writer() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let mut writer = DailyFileWriter::new(dir.path().join("logs")).unwrap();
    writer.write_all(b"first line\n").unwrap();
    writer.flush().unwrap();

    let path = writer.current_path();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first line\n");
}
