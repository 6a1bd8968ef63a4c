//! # Application Configuration
//!
//! Loads [`EngineConfig`] plus the database settings from disk and the
//! environment.
//!
//! ## Load Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults (EngineConfig::default, data dir database)                │
//! │  2. devis.toml (explicit path, or the platform config dir)             │
//! │  3. DEVIS_* environment variables                                      │
//! │  4. Validation                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## File Format
//! ```toml
//! [vat]
//! permitted_rates_bps = [0, 700, 1000, 1400, 2000]
//! default_rate_bps = 2000
//!
//! [limits]
//! max_items = 500
//! max_depth = 8
//!
//! [history]
//! undo_depth = 50
//!
//! [database]
//! path = "/var/lib/devis/devis.db"
//! max_connections = 5
//! ```
//!
//! ## Environment Variables
//! | Variable                 | Overrides                    |
//! |--------------------------|------------------------------|
//! | `DEVIS_DATABASE_PATH`    | `database.path`              |
//! | `DEVIS_MAX_CONNECTIONS`  | `database.max_connections`   |
//! | `DEVIS_DEFAULT_VAT_BPS`  | `vat.default_rate_bps`       |
//! | `DEVIS_MAX_ITEMS`        | `limits.max_items`           |
//! | `DEVIS_MAX_DEPTH`        | `limits.max_depth`           |
//! | `DEVIS_UNDO_DEPTH`       | `history.undo_depth`         |

use devis_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

const CONFIG_FILE_NAME: &str = "devis.toml";
const DATABASE_FILE_NAME: &str = "devis.db";

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "devis", "devis")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// App Configuration
// =============================================================================

/// Engine tunables plus where the quotes are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl AppConfig {
    /// Loads configuration from file and environment.
    ///
    /// A missing file is not an error: defaults apply. A file that exists
    /// but does not parse is.
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    DbError::Config(format!("Cannot read {}: {}", path.display(), e))
                })?;
                config = Self::parse(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config, falling back to defaults when loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document without validating it.
    pub fn parse(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Checks engine rules and database settings.
    pub fn validate(&self) -> DbResult<()> {
        self.engine.validate()?;

        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::file(self.database.path.clone())
            .with_max_connections(self.database.max_connections)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `DEVIS_*` values from `lookup`. Unparseable numbers are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("DEVIS_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = parse_var(&lookup, "DEVIS_MAX_CONNECTIONS") {
            self.database.max_connections = value;
        }

        if let Some(value) = parse_var::<u32, _>(&lookup, "DEVIS_DEFAULT_VAT_BPS") {
            debug!(bps = value, "Overriding default VAT rate from environment");
            self.engine.vat.default_rate_bps = value;
        }

        if let Some(value) = parse_var(&lookup, "DEVIS_MAX_ITEMS") {
            self.engine.limits.max_items = value;
        }

        if let Some(value) = parse_var(&lookup, "DEVIS_MAX_DEPTH") {
            self.engine.limits.max_depth = value;
        }

        if let Some(value) = parse_var(&lookup, "DEVIS_UNDO_DEPTH") {
            self.engine.history.undo_depth = value;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "devis", "devis")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.max_connections, 5);
        assert!(config.database.path.ends_with(DATABASE_FILE_NAME));
    }

    #[test]
    fn test_parse_flat_sections() {
        let config = AppConfig::parse(
            r#"
            [vat]
            default_rate_bps = 1000

            [limits]
            max_items = 40

            [database]
            path = "/tmp/quotes.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.vat.default_rate_bps, 1000);
        assert_eq!(config.engine.limits.max_items, 40);
        assert_eq!(config.engine.limits.max_depth, devis_core::MAX_NESTING_DEPTH);
        assert_eq!(config.database.path, PathBuf::from("/tmp/quotes.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            ("DEVIS_DATABASE_PATH", "/srv/devis.db"),
            ("DEVIS_DEFAULT_VAT_BPS", "700"),
            ("DEVIS_MAX_ITEMS", "12"),
            ("DEVIS_UNDO_DEPTH", "0"),
        ]));

        assert_eq!(config.database.path, PathBuf::from("/srv/devis.db"));
        assert_eq!(config.engine.vat.default_rate_bps, 700);
        assert_eq!(config.engine.limits.max_items, 12);
        assert_eq!(config.engine.history.undo_depth, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[("DEVIS_MAX_ITEMS", "lots")]));
        assert_eq!(config.engine.limits.max_items, devis_core::MAX_QUOTE_ITEMS);
    }

    #[test]
    fn test_override_to_unpermitted_rate_fails_validation() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[("DEVIS_DEFAULT_VAT_BPS", "550")]));
        assert!(matches!(config.validate(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let path = std::env::temp_dir().join(format!("devis-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[history]\nundo_depth = 3\n").unwrap();

        let config = AppConfig::load(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.engine.history.undo_depth, 3);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("devis-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[limits\nmax_items = ").unwrap();

        let result = AppConfig::load(Some(path.clone()));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
