//! # Connection Pool
//!
//! Opens the SQLite pool that backs the quote repository.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AppConfig::load() ──► AppConfig::db_config() ──► DbConfig              │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │  Database::new(config).await                                            │
//! │     ├── connect_options(): file or :memory:, WAL, foreign keys          │
//! │     ├── SqlitePoolOptions ──► SqlitePool (max_connections)              │
//! │     └── migrations::run_migrations() when `migrate` is set              │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │  db.quotes().bulk_save(&payload) / db.quotes().load(id)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL journaling lets quote lists and previews read while a bulk save is
//! writing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::quote::QuoteRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// A file, created on first connect.
    File(PathBuf),
    /// A private in-memory database (tests, dry runs).
    Memory,
}

impl fmt::Display for DbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbLocation::File(path) => write!(f, "{}", path.display()),
            DbLocation::Memory => f.write_str(":memory:"),
        }
    }
}

/// Pool settings.
///
/// ```rust,ignore
/// let config = DbConfig::file("/var/lib/devis/devis.db").with_max_connections(4);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,
    pub max_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Apply pending migrations on connect.
    pub migrate: bool,
}

impl DbConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            migrate: true,
        }
    }

    /// Each connection to `:memory:` opens its own database, so the pool is
    /// pinned to a single connection.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            migrate: true,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        if self.location != DbLocation::Memory {
            self.max_connections = max;
        }
        self
    }

    pub fn without_migrations(mut self) -> Self {
        self.migrate = false;
        self
    }
}

fn connect_options(location: &DbLocation) -> DbResult<SqliteConnectOptions> {
    let options = match location {
        DbLocation::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal),
        DbLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
    };

    // Foreign keys are off by default in SQLite; item rows rely on them to
    // follow their quote.
    Ok(options
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true))
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(location = %config.location, "Opening database");

        let options = connect_options(&config.location)?;
        debug!(?options, "Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(max_connections = config.max_connections, "Database pool ready");

        let db = Database { pool };
        if config.migrate {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    /// Raw pool, for queries outside the repository.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// ```rust,ignore
    /// let saved = db.quotes().bulk_save(&state.save_payload()?).await?;
    /// ```
    pub fn quotes(&self) -> QuoteRepository {
        QuoteRepository::new(self.pool.clone())
    }

    /// Later repository calls fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        let (embedded, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(embedded, applied);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
    }

    #[test]
    fn test_memory_pool_stays_single_connection() {
        let config = DbConfig::in_memory().with_max_connections(8);
        assert_eq!(config.max_connections, 1);

        let config = DbConfig::file("/tmp/devis-test.db")
            .with_max_connections(8)
            .without_migrations();
        assert_eq!(config.max_connections, 8);
        assert!(!config.migrate);
        assert_eq!(config.location.to_string(), "/tmp/devis-test.db");
    }
}
