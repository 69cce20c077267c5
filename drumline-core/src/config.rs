//! Runtime configuration shared by the binaries.

use std::path::PathBuf;

pub const DB_ENV: &str = "DRUMLINE_DB";
pub const LOG_ENV: &str = "DRUMLINE_LOG";
pub const DEFAULT_LOG_FILTER: &str = "drumline_service=info,drumline_core=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding the persisted categories
    pub database: PathBuf,
    /// `tracing_subscriber::EnvFilter` directives
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database = var(DB_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);
        let log_filter = var(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            database,
            log_filter,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drumline")
        .join("drumline.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(lookup(&[]));
        assert!(config.database.ends_with("drumline/drumline.db"));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(lookup(&[
            (DB_ENV, "/tmp/rules.db"),
            (LOG_ENV, "drumline_core=debug"),
        ]));
        assert_eq!(config.database, PathBuf::from("/tmp/rules.db"));
        assert_eq!(config.log_filter, "drumline_core=debug");
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = Config::from_vars(lookup(&[(DB_ENV, "  "), (LOG_ENV, "")]));
        assert_eq!(config, Config::default());
    }
}
