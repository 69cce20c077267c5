/// Database schema for Drumline
pub const SCHEMA: &str = r#"
-- One row per persisted category ('blocked', 'dailyBlockTimes')
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Stored in `PRAGMA user_version`; the values themselves carry no version.
pub const SCHEMA_VERSION: i32 = 1;
