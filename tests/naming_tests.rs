use ironplate::naming::{column_name, index_name, pluralize, table_name};

#[test]
fn test_column_name_pascal_and_camel() {
    assert_eq!(column_name("Name"), "name");
    assert_eq!(column_name("CreatedAt"), "created_at");
    assert_eq!(column_name("requestBody"), "request_body");
    assert_eq!(column_name("StatusCode"), "status_code");
}

#[test]
fn test_column_name_acronyms() {
    assert_eq!(column_name("ID"), "id");
    assert_eq!(column_name("UserID"), "user_id");
    assert_eq!(column_name("URL"), "url");
    assert_eq!(column_name("HTTPStatus"), "http_status");
    assert_eq!(column_name("APIKeyID"), "api_key_id");
}

#[test]
fn test_column_name_digits() {
    assert_eq!(column_name("Sha256Sum"), "sha256_sum");
}

#[test]
fn test_column_name_idempotent() {
    for ident in ["UserID", "HTTPStatus", "CreatedAt", "user_type", "deleted_at"] {
        let once = column_name(ident);
        assert_eq!(column_name(&once), once, "not idempotent for {ident}");
    }
}

#[test]
fn test_table_name_known_and_derived() {
    assert_eq!(table_name("User"), "users");
    assert_eq!(table_name("Log"), "logs");
    assert_eq!(table_name("MigrationRecord"), "migrations");
    assert_eq!(table_name("Department"), "departments");
    assert_eq!(table_name("GarmentCategory"), "garment_categories");
    assert_eq!(table_name("Box"), "boxes");
}

#[test]
fn test_pluralize_rules() {
    assert_eq!(pluralize("key"), "keys");
    assert_eq!(pluralize("city"), "cities");
    assert_eq!(pluralize("batch"), "batches");
    assert_eq!(pluralize("status"), "statuses");
    assert_eq!(pluralize(""), "");
}

#[test]
fn test_index_name() {
    assert_eq!(index_name("users", "email"), "idx_users_email");
}
