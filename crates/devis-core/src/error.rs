//! # Error Types
//!
//! Domain-specific error types for devis-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  devis-core errors (this file)                                         │
//! │  ├── EngineError         - What a rejected intent reports              │
//! │  ├── ValidationError     - Field-level input failures (recoverable)    │
//! │  └── InvariantViolation  - Structural risks (cycle, orphan, gaps)      │
//! │                                                                         │
//! │  devis-db errors (separate crate)                                      │
//! │  └── DbError             - Database / config failures                  │
//! │                                                                         │
//! │  Flow: ValidationError ─┐                                              │
//! │        InvariantViolation ┼─► EngineError ─► caller (form, drag handle) │
//! │        NotFound ─────────┘                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (item id, field, limits)
//! 3. No error is fatal: a rejected intent leaves the snapshot untouched

use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Engine Error
// =============================================================================

/// Errors returned by every mutation of the quote tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The intent would corrupt the tree structure.
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    /// The referenced entity no longer exists.
    ///
    /// ## When This Occurs
    /// - Editing an item that was removed by an earlier intent
    /// - Re-keying a temporary id that is not in the tree
    /// - Adding a catalog entry the lookup does not know
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl EngineError {
    /// Creates a NotFound error for an item id.
    pub fn item_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: "Item",
            id: id.into(),
        }
    }

    /// Returns the broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Invariant(_) => ErrorKind::Invariant,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Broad error category, for upstream mapping (HTTP status, toast style).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Invariant,
    NotFound,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Every variant names the offending field so a form can attach the message
/// to the right input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: String,
        min: Decimal,
        max: Decimal,
    },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Fixed discount larger than the base it applies to.
    #[error("{field} {amount} exceeds the reference total {reference_total}")]
    ExceedsReference {
        field: String,
        amount: Decimal,
        reference_total: Decimal,
    },

    /// Field cannot be set on this kind of item.
    #[error("{field} cannot be set on a {item_type} item")]
    NotApplicable { field: String, item_type: String },

    /// Too many items in one quote.
    #[error("{field} cannot exceed {max}")]
    LimitExceeded { field: String, max: usize },

    /// An amount derived from the field no longer fits the numeric range.
    #[error("{field} is too large to compute")]
    Overflow { field: String },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::ExceedsReference { field, .. }
            | ValidationError::NotApplicable { field, .. }
            | ValidationError::LimitExceeded { field, .. }
            | ValidationError::Overflow { field } => field,
        }
    }
}

// =============================================================================
// Invariant Violation
// =============================================================================

/// Structural problems that would leave the tree inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// `parent_id` references an item that does not exist.
    #[error("Item {id} references missing parent {parent_id}")]
    MissingParent { id: String, parent_id: String },

    /// Only chapters and sections may own children.
    #[error("Item {parent_id} is a {parent_type} and cannot have children")]
    ParentNotStructural {
        parent_id: String,
        parent_type: String,
    },

    /// The item would become its own ancestor.
    #[error("Item {id} would be its own ancestor")]
    Cycle { id: String },

    /// Two items share one id.
    #[error("Item id {id} already exists")]
    DuplicateId { id: String },

    /// Sibling positions are not exactly 1..N.
    #[error("Positions under {parent} are not contiguous: {positions:?}")]
    PositionGap { parent: String, positions: Vec<u32> },

    /// Moving an item under another parent is not supported.
    #[error("Item {id} cannot move from {from} to {to}")]
    CrossParentMove { id: String, from: String, to: String },

    /// Nesting deeper than the configured limit.
    #[error("Item {id} would be nested deeper than {max} levels")]
    DepthExceeded { id: String, max: usize },

    /// A server id is already used by another item.
    #[error("Server id {server_id} collides with an existing item")]
    IdCollision { server_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================
