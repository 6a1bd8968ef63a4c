//! # Repository Module
//!
//! SQL access for Devis, isolated behind repository types.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MutationController ── save_payload() ──► QuoteRepository::bulk_save   │
//! │         ▲                                        │                      │
//! │         │  Intent::AssignServerIds(SavedQuote)   │ one transaction      │
//! │         └────────────────────────────────────────┘                      │
//! │                                                                         │
//! │  QuoteRepository::open(id) ──► MutationController::load (re-validated) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`quote::QuoteRepository`] - Quote headers and their item trees

pub mod quote;
