//! Naming conventions shared by the extractor and the migrator.
//!
//! Field identifiers are written in the Pascal/camel style of model
//! definitions (`UserID`, `RequestBody`) and map to snake-case columns.
//! A run of capitals is treated as a single word, so acronyms come out as
//! one lower-case segment (`UserID` -> `user_id`, `HTTPStatus` -> `http_status`).

/// Types whose table name does not follow the plural rule, or that other
/// models reference by name.
const KNOWN_TABLES: &[(&str, &str)] = &[
    ("User", "users"),
    ("Log", "logs"),
    ("MigrationRecord", "migrations"),
];

/// Convert a field identifier into its column name.
///
/// Already snake-cased input is returned unchanged, so the conversion is
/// idempotent.
pub fn column_name(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }
        if i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && prev != '_' {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Resolve the table backing a model type name.
pub fn table_name(type_name: &str) -> String {
    KNOWN_TABLES
        .iter()
        .find(|(ty, _)| *ty == type_name)
        .map(|(_, table)| (*table).to_string())
        .unwrap_or_else(|| pluralize(&column_name(type_name)))
}

/// English plural for a snake-case word, applied to its last segment.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Name of the single-column index created for `column` on `table`.
pub fn index_name(table: &str, column: &str) -> String {
    format!("idx_{table}_{column}")
}
