//! # devis-db: Persistence Layer for Devis
//!
//! SQLite storage for quotes, plus loading of the engine configuration from
//! `devis.toml` and `DEVIS_*` variables.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Devis Data Flow                                  │
//! │                                                                         │
//! │  MutationController (devis-core)                                        │
//! │       │ save_payload()                        ▲ AssignServerIds         │
//! │       ▼                                       │                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     devis-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ QuoteRepository│    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ bulk_save/load │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   AppConfig: defaults → devis.toml → DEVIS_* → validate         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (platform data dir)/devis.db                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use devis_db::{AppConfig, Database};
//!
//! let config = AppConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let saved = db.quotes().bulk_save(&controller.state().save_payload()?).await?;
//! controller.dispatch(Intent::AssignServerIds { saved })?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AppConfig, DatabaseSettings};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};
pub use repository::quote::{LoadedQuote, QuoteRepository, QuoteSummary};
