//! # devis-core: Quote Line-Item Engine
//!
//! Pure engine behind the quote editor: the line-item tree, its ordering
//! rules, discounts and every derived total. Zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Devis Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Web client (quote editor)                    │   │
//! │  │    Item table ──► Drag handle ──► Library picker ──► Preview    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Intent (JSON, ts-rs bindings)          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ devis-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   MutationController ──► ItemStore ──► PositionSequencer        │   │
//! │  │          │                    │                                 │   │
//! │  │          │               DiscountResolver                       │   │
//! │  │          ▼                                                      │   │
//! │  │   HierarchyIndex ──► CalculationEngine ──► QuoteState snapshot  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ SavePayload / SavedQuote               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    devis-db (Persistence)                       │   │
//! │  │              SQLite bulk save, migrations, config files         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, ids, VAT rates, add/update payloads, quote metadata
//! - [`money`] - Rounded presentation amounts (integer cents)
//! - [`store`] - ItemStore: flat keyed collection
//! - [`hierarchy`] - HierarchyIndex: children/roots views, structural checks
//! - [`sequencer`] - PositionSequencer: contiguous sibling positions
//! - [`discount`] - DiscountResolver: discount requests to signed leaves
//! - [`calculation`] - CalculationEngine: per-item, per-section, document, VAT
//! - [`controller`] - MutationController, intents and snapshots
//! - [`catalog`] - Catalog lookup and entry mapping
//! - [`persistence`] - Bulk-save payload and id re-keying
//! - [`validation`] - Field-level rules
//! - [`config`] - Engine tunables
//! - [`error`] - Error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: a snapshot is a deterministic function of the flat item collection
//! 2. **No I/O**: database, network and file system access live in devis-db
//! 3. **Decimal Amounts**: full precision everywhere, rounded to cents only for presentation
//! 4. **All-or-Nothing**: a rejected intent leaves the previous snapshot untouched
//!
//! ## Example Usage
//!
//! ```rust
//! use devis_core::controller::{Intent, MutationController};
//! use devis_core::config::EngineConfig;
//! use devis_core::types::{ItemType, NewItem, QuoteMetadata, VatRate};
//! use devis_core::Money;
//! use rust_decimal::Decimal;
//!
//! let mut quote = MutationController::new(
//!     QuoteMetadata::new(VatRate::from_percent(20)),
//!     EngineConfig::default(),
//! );
//!
//! quote.dispatch(Intent::AddItem { item: NewItem::chapter("Masonry").with_id("c1") }).unwrap();
//! let state = quote
//!     .dispatch(Intent::AddItem {
//!         item: NewItem::priced(ItemType::Work, "Block wall", Decimal::from(2), Decimal::from(50))
//!             .under("c1"),
//!     })
//!     .unwrap();
//!
//! assert_eq!(state.calculations().document.total_ttc, Money::from_cents(12_000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calculation;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod discount;
pub mod error;
pub mod hierarchy;
pub mod money;
pub mod persistence;
pub mod sequencer;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use calculation::{calculate, Calculations, DocumentTotals, ItemTotals, VatBreakdownEntry};
pub use config::EngineConfig;
pub use controller::{apply, Intent, MutationController, MutationPhase, QuoteState};
pub use error::{EngineError, EngineResult, ErrorKind, InvariantViolation, ValidationError};
pub use hierarchy::HierarchyIndex;
pub use money::Money;
pub use store::ItemStore;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// VAT rates accepted when no configuration overrides them (0, 7, 10, 14, 20%).
pub const PERMITTED_VAT_RATES_BPS: [u32; 5] = [0, 700, 1000, 1400, 2000];

/// Prevailing VAT rate of a new quote (20%).
pub const DEFAULT_VAT_RATE_BPS: u32 = 2000;

/// Maximum items in a single quote.
///
/// ## Business Reason
/// Quotes hold tens to low hundreds of lines. Anything far beyond that is
/// runaway input (a pasted spreadsheet, a loop in a client script).
pub const MAX_QUOTE_ITEMS: usize = 500;

/// Maximum nesting depth; chapters sit at depth 1.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Maximum length of a designation, in characters.
pub const MAX_DESIGNATION_LENGTH: usize = 500;

/// Largest quantity accepted on one line.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Largest unit price accepted on one line (10 million).
///
/// With [`MAX_QUANTITY`] and [`MAX_QUOTE_ITEMS`] the document total stays
/// well inside what [`Money`] can hold in cents.
pub const MAX_UNIT_PRICE: i64 = 10_000_000;
