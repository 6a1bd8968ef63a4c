//! # Mutation Controller
//!
//! The single entry point that changes a quote. Every change is an [`Intent`];
//! every accepted intent produces a new immutable [`QuoteState`].
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──dispatch(intent)──► Validating ──err──► Rejected               │
//! │    ▲                             │              (snapshot unchanged)    │
//! │    │                             ▼                                      │
//! │    │                          Applying      store / sequencer /         │
//! │    │                             │          discount resolver           │
//! │    │                             ▼                                      │
//! │    │                         Recomputing    HierarchyIndex rebuilt,     │
//! │    │                             │          positions checked,          │
//! │    │                             │          calculate() full pass       │
//! │    └──────── new Arc<QuoteState> ┘                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All work happens on a clone of the current item store. A failure at any
//! stage drops the clone, so the tree is never partially mutated.
//!
//! [`apply`] is the pure transition function. [`MutationController`] wraps
//! it with phase tracking, logging and undo/redo.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

use crate::calculation::{calculate, Calculations, ItemTotals};
use crate::catalog::{CatalogEntry, CatalogLookup};
use crate::config::EngineConfig;
use crate::discount::{self, DiscountRequest};
use crate::error::{EngineError, EngineResult, InvariantViolation};
use crate::hierarchy::{check_attach, HierarchyIndex};
use crate::persistence::{check_assignments, rekey_items, IdAssignment, SavePayload, SavedQuote};
use crate::sequencer;
use crate::store::ItemStore;
use crate::types::{Item, ItemId, ItemPatch, NewItem, QuoteMetadata, VatRate};
use crate::validation::{
    validate_designation, validate_discount_value, validate_item_count, validate_new_item,
    validate_patch, validate_stored_item, validate_vat_rate,
};

// =============================================================================
// Intents
// =============================================================================

/// A serializable request to change the quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum Intent {
    /// Adds a chapter, section or priced leaf.
    AddItem { item: NewItem },

    /// Patches descriptive or priced fields of one item.
    UpdateItem { id: ItemId, patch: ItemPatch },

    /// Removes an item and its whole subtree.
    RemoveItem { id: ItemId },

    /// Reorders an item among its siblings.
    ///
    /// `target_parent_id` is what a drag handle reports as the drop scope;
    /// anything other than the current parent is rejected.
    MoveItem {
        id: ItemId,
        #[serde(rename = "newPosition")]
        new_position: u32,
        #[serde(default, rename = "targetParentId")]
        target_parent_id: Option<ItemId>,
    },

    /// Adds a discount resolved against the current document HT.
    ApplyDiscount { request: DiscountRequest },

    /// Appends a resolved catalog entry at the end of a scope.
    AddCatalogEntry {
        entry: CatalogEntry,
        #[serde(default, rename = "parentId")]
        parent_id: Option<ItemId>,
        #[ts(as = "String")]
        quantity: Decimal,
    },

    /// Replaces temporary ids with the ids returned by a bulk save.
    AssignServerIds { saved: SavedQuote },

    /// Replaces document metadata.
    UpdateMetadata { metadata: QuoteMetadata },
}

impl Intent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::AddItem { .. } => "add_item",
            Intent::UpdateItem { .. } => "update_item",
            Intent::RemoveItem { .. } => "remove_item",
            Intent::MoveItem { .. } => "move_item",
            Intent::ApplyDiscount { .. } => "apply_discount",
            Intent::AddCatalogEntry { .. } => "add_catalog_entry",
            Intent::AssignServerIds { .. } => "assign_server_ids",
            Intent::UpdateMetadata { .. } => "update_metadata",
        }
    }
}

// =============================================================================
// Quote State
// =============================================================================

/// Immutable snapshot of one quote: items plus everything derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteState {
    metadata: QuoteMetadata,
    items: ItemStore,
    index: HierarchyIndex,
    calculations: Calculations,
    revision: u64,
}

/// One row of the display outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OutlineRow {
    #[serde(flatten)]
    pub item: Item,
    /// Roots are at depth 1.
    pub depth: u32,
    #[serde(flatten)]
    pub totals: ItemTotals,
}

impl QuoteState {
    /// An empty quote.
    pub fn empty(metadata: QuoteMetadata) -> Self {
        QuoteState {
            metadata,
            items: ItemStore::new(),
            index: HierarchyIndex::default(),
            calculations: Calculations::default(),
            revision: 0,
        }
    }

    pub fn metadata(&self) -> &QuoteMetadata {
        &self.metadata
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn calculations(&self) -> &Calculations {
        &self.calculations
    }

    /// Number of intents applied since the quote was loaded.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Items in display order with their depth and totals.
    pub fn outline(&self) -> Vec<OutlineRow> {
        self.index
            .walk()
            .into_iter()
            .filter_map(|(id, depth)| {
                let item = self.items.get(id.as_str())?;
                Some(OutlineRow {
                    item: item.clone(),
                    depth: depth as u32,
                    totals: self.calculations.totals(id.as_str()).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// This snapshot with the saved ids applied to whichever of its
    /// temporary items they name.
    fn with_server_ids(&self, saved: &SavedQuote, config: &EngineConfig) -> EngineResult<Self> {
        let assignments: Vec<IdAssignment> = saved
            .assignments
            .iter()
            .filter(|assignment| self.items.contains(assignment.temporary_id.as_str()))
            .cloned()
            .collect();
        let metadata = QuoteMetadata {
            id: Some(saved.quote_id.clone()),
            ..self.metadata.clone()
        };

        settle(
            Staged {
                metadata,
                items: rekey_items(&self.items, &assignments)?,
            },
            self.revision,
            config,
        )
    }

    /// Bulk-save payload of this snapshot.
    pub fn save_payload(&self) -> EngineResult<SavePayload> {
        Ok(SavePayload::build(
            &self.metadata,
            &self.items,
            &self.calculations,
        )?)
    }
}

// =============================================================================
// Transition Function
// =============================================================================

/// Result of the apply stage, before derived data is rebuilt.
struct Staged {
    metadata: QuoteMetadata,
    items: ItemStore,
}

/// Applies one intent to a snapshot, returning the next snapshot.
///
/// Pure: `state` is never modified and the same inputs give the same output
/// (apart from generated temporary ids).
pub fn apply(state: &QuoteState, intent: &Intent, config: &EngineConfig) -> EngineResult<QuoteState> {
    validate(state, intent, config)?;
    let staged = stage(state, intent)?;
    settle(staged, state.revision + 1, config)
}

/// Checks every precondition of `intent` against the current snapshot.
/// Nothing is copied or changed.
fn validate(state: &QuoteState, intent: &Intent, config: &EngineConfig) -> EngineResult<()> {
    let items = &state.items;
    let permitted = config.permitted_vat_rates();

    match intent {
        Intent::AddItem { item } => check_new_item(items, item, &permitted, config),

        Intent::UpdateItem { id, patch } => {
            let item_type = items.require(id.as_str())?.item_type;
            Ok(validate_patch(patch, item_type, &permitted)?)
        }

        Intent::RemoveItem { id } => items.require(id.as_str()).map(|_| ()),

        Intent::MoveItem {
            id,
            new_position,
            target_parent_id,
        } => {
            let current = items.require(id.as_str())?.parent_id.as_ref();
            if let Some(target) = target_parent_id {
                if current != Some(target) {
                    return Err(InvariantViolation::CrossParentMove {
                        id: id.to_string(),
                        from: scope_label(current),
                        to: target.to_string(),
                    }
                    .into());
                }
            }
            sequencer::check_slot(*new_position, items.siblings(current).len())
        }

        Intent::ApplyDiscount { request } => {
            validate_item_count(items.len(), config.limits.max_items)?;
            check_fresh_id(items, request.id.as_ref())?;
            if let Some(parent) = &request.parent_id {
                check_attach(items, request.id.as_ref(), parent, config.limits.max_depth)?;
            }
            if let Some(designation) = &request.designation {
                validate_designation(designation)?;
            }
            let reference_total = state.calculations.document.total_ht.to_decimal();
            Ok(validate_discount_value(
                request.mode,
                request.value,
                reference_total,
            )?)
        }

        Intent::AddCatalogEntry {
            entry,
            parent_id,
            quantity,
        } => {
            let new_item = entry.clone().into_new_item(
                parent_id.clone(),
                *quantity,
                state.metadata.default_vat_rate,
            );
            check_new_item(items, &new_item, &permitted, config)
        }

        Intent::AssignServerIds { saved } => check_assignments(items, &saved.assignments),

        Intent::UpdateMetadata { metadata } => {
            Ok(validate_vat_rate(metadata.default_vat_rate, &permitted)?)
        }
    }
}

/// Applies a validated intent to a copy of the store.
fn stage(state: &QuoteState, intent: &Intent) -> EngineResult<Staged> {
    let mut items = state.items.clone();
    let mut metadata = state.metadata.clone();

    match intent {
        Intent::AddItem { item } => {
            insert_new_item(&mut items, item, metadata.default_vat_rate)?;
        }

        Intent::UpdateItem { id, patch } => {
            items.update(id.as_str(), patch)?;
        }

        Intent::RemoveItem { id } => {
            let removed = items.remove_cascade(id.as_str())?;
            let parent = removed.first().and_then(|item| item.parent_id.clone());
            sequencer::renumber(&mut items, parent.as_ref());
        }

        Intent::MoveItem {
            id, new_position, ..
        } => {
            sequencer::move_to(&mut items, id.as_str(), *new_position)?;
        }

        Intent::ApplyDiscount { request } => {
            let reference_total = state.calculations.document.total_ht.to_decimal();
            let discount = discount::resolve(request, reference_total, metadata.default_vat_rate)?;
            let id = discount.id.clone();
            items.insert(discount)?;
            sequencer::place(&mut items, id.as_str(), None)?;
        }

        Intent::AddCatalogEntry {
            entry,
            parent_id,
            quantity,
        } => {
            let new_item =
                entry
                    .clone()
                    .into_new_item(parent_id.clone(), *quantity, metadata.default_vat_rate);
            insert_new_item(&mut items, &new_item, metadata.default_vat_rate)?;
        }

        Intent::AssignServerIds { saved } => {
            items = rekey_items(&items, &saved.assignments)?;
            metadata.id = Some(saved.quote_id.clone());
        }

        Intent::UpdateMetadata { metadata: next } => {
            let id = next.id.clone().or_else(|| metadata.id.take());
            metadata = QuoteMetadata { id, ..next.clone() };
        }
    }

    Ok(Staged { metadata, items })
}

/// Rebuilds derived data and re-checks the structural invariants.
fn settle(staged: Staged, revision: u64, config: &EngineConfig) -> EngineResult<QuoteState> {
    let index = HierarchyIndex::build(&staged.items)?;
    index.check_positions(&staged.items)?;

    if index.max_depth() > config.limits.max_depth {
        let deepest = index
            .walk()
            .into_iter()
            .find(|(_, depth)| *depth > config.limits.max_depth)
            .map(|(id, _)| id.to_string())
            .unwrap_or_default();
        return Err(InvariantViolation::DepthExceeded {
            id: deepest,
            max: config.limits.max_depth,
        }
        .into());
    }

    let calculations = calculate(&staged.items)?;
    Ok(QuoteState {
        metadata: staged.metadata,
        items: staged.items,
        index,
        calculations,
        revision,
    })
}

fn check_new_item(
    items: &ItemStore,
    new_item: &NewItem,
    permitted: &[VatRate],
    config: &EngineConfig,
) -> EngineResult<()> {
    validate_item_count(items.len(), config.limits.max_items)?;
    validate_new_item(new_item, permitted)?;
    check_fresh_id(items, new_item.id.as_ref())?;

    if let Some(parent) = &new_item.parent_id {
        check_attach(items, new_item.id.as_ref(), parent, config.limits.max_depth)?;
    }
    if let Some(position) = new_item.position {
        let slots = items.siblings(new_item.parent_id.as_ref()).len() + 1;
        sequencer::check_slot(position, slots)?;
    }

    Ok(())
}

fn check_fresh_id(items: &ItemStore, id: Option<&ItemId>) -> EngineResult<()> {
    match id {
        Some(id) if items.contains(id.as_str()) => {
            Err(InvariantViolation::DuplicateId { id: id.to_string() }.into())
        }
        _ => Ok(()),
    }
}

fn insert_new_item(
    items: &mut ItemStore,
    new_item: &NewItem,
    prevailing_rate: VatRate,
) -> EngineResult<()> {
    let id = new_item.id.clone().unwrap_or_else(ItemId::temporary);
    items.insert(materialize(id.clone(), new_item, prevailing_rate))?;
    sequencer::place(items, id.as_str(), new_item.position)?;
    Ok(())
}

/// Turns an add payload into a stored item. Structural items keep zeroed
/// priced fields.
fn materialize(id: ItemId, new_item: &NewItem, prevailing_rate: VatRate) -> Item {
    let priced = new_item.item_type.is_priced();
    Item {
        id,
        item_type: new_item.item_type,
        parent_id: new_item.parent_id.clone(),
        position: 0,
        designation: new_item.designation.clone(),
        description: new_item.description.clone(),
        reference: new_item.reference.clone(),
        unit: new_item.unit.clone(),
        quantity: if priced { new_item.quantity } else { Decimal::ZERO },
        unit_price: if priced { new_item.unit_price } else { Decimal::ZERO },
        discount_percentage: if priced {
            new_item.discount_percentage
        } else {
            Decimal::ZERO
        },
        vat_rate: if priced {
            new_item.vat_rate.unwrap_or(prevailing_rate)
        } else {
            VatRate::zero()
        },
        work_id: new_item.work_id.clone(),
        margin_percentage: if priced {
            new_item.margin_percentage
        } else {
            None
        },
        discount: None,
    }
}

fn scope_label(parent: Option<&ItemId>) -> String {
    parent
        .map(ItemId::to_string)
        .unwrap_or_else(|| "root".to_string())
}

// =============================================================================
// Controller
// =============================================================================

/// Where the controller is in its current (or last) mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MutationPhase {
    Idle,
    Validating,
    /// The last intent failed; the snapshot is the one from before it.
    Rejected,
    Applying,
    Recomputing,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationPhase::Idle => "idle",
            MutationPhase::Validating => "validating",
            MutationPhase::Rejected => "rejected",
            MutationPhase::Applying => "applying",
            MutationPhase::Recomputing => "recomputing",
        };
        f.write_str(name)
    }
}

/// Owner of the current quote snapshot.
///
/// Intents are applied one at a time, in call order. Readers hold on to the
/// `Arc<QuoteState>` they were given; it never changes under them.
pub struct MutationController {
    config: EngineConfig,
    state: Arc<QuoteState>,
    phase: MutationPhase,
    undo_stack: VecDeque<Arc<QuoteState>>,
    redo_stack: Vec<Arc<QuoteState>>,
}

impl MutationController {
    /// Starts an empty quote.
    pub fn new(metadata: QuoteMetadata, config: EngineConfig) -> Self {
        MutationController {
            config,
            state: Arc::new(QuoteState::empty(metadata)),
            phase: MutationPhase::Idle,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Starts from a persisted tree.
    ///
    /// The tree is rejected unless every structural invariant holds and every
    /// stored item passes the same field rules as a fresh add.
    pub fn load(
        metadata: QuoteMetadata,
        items: Vec<Item>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        validate_item_count(items.len().saturating_sub(1), config.limits.max_items)?;
        let permitted = config.permitted_vat_rates();
        validate_vat_rate(metadata.default_vat_rate, &permitted)?;

        let store = ItemStore::from_items(items)?;
        for item in store.iter() {
            validate_stored_item(item, &permitted).map_err(|err| {
                warn!(id = %item.id, error = %err, "Stored item rejected");
                err
            })?;
        }

        let state = settle(
            Staged {
                metadata,
                items: store,
            },
            0,
            &config,
        )?;
        debug!(items = state.items.len(), "Quote loaded");

        Ok(MutationController {
            config,
            state: Arc::new(state),
            phase: MutationPhase::Idle,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        })
    }

    /// The current snapshot.
    pub fn state(&self) -> Arc<QuoteState> {
        Arc::clone(&self.state)
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies one intent. On error the current snapshot stays as it was.
    pub fn dispatch(&mut self, intent: Intent) -> EngineResult<Arc<QuoteState>> {
        self.enter(MutationPhase::Validating);
        if let Err(err) = validate(&self.state, &intent, &self.config) {
            return Err(self.reject(&intent, err));
        }

        self.enter(MutationPhase::Applying);
        let staged = match stage(&self.state, &intent) {
            Ok(staged) => staged,
            Err(err) => return Err(self.reject(&intent, err)),
        };

        self.enter(MutationPhase::Recomputing);
        let revision = self.state.revision + 1;
        let next = match settle(staged, revision, &self.config) {
            Ok(next) => Arc::new(next),
            Err(err) => return Err(self.reject(&intent, err)),
        };

        debug!(
            intent = intent.name(),
            revision,
            items = next.items.len(),
            total_ht = %next.calculations.document.total_ht,
            "Intent applied"
        );

        match &intent {
            Intent::AssignServerIds { saved } => self.commit_server_ids(next, saved),
            _ => self.commit(next),
        }
        self.enter(MutationPhase::Idle);
        Ok(self.state())
    }

    /// Looks up a catalog entry and appends it at the end of `parent_id`.
    pub fn add_from_catalog(
        &mut self,
        catalog: &dyn CatalogLookup,
        entry_id: &str,
        parent_id: Option<ItemId>,
        quantity: Decimal,
    ) -> EngineResult<Arc<QuoteState>> {
        let entry = catalog.find(entry_id).ok_or_else(|| {
            warn!(entry_id, "Catalog entry not found");
            EngineError::NotFound {
                entity: "Catalog entry",
                id: entry_id.to_string(),
            }
        })?;

        self.dispatch(Intent::AddCatalogEntry {
            entry,
            parent_id,
            quantity,
        })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Restores the snapshot before the last applied intent.
    pub fn undo(&mut self) -> Option<Arc<QuoteState>> {
        let previous = self.undo_stack.pop_back()?;
        let current = std::mem::replace(&mut self.state, previous);
        self.redo_stack.push(current);
        debug!(revision = self.state.revision, "Undo");
        Some(self.state())
    }

    /// Re-applies the last undone snapshot.
    pub fn redo(&mut self) -> Option<Arc<QuoteState>> {
        let next = self.redo_stack.pop()?;
        let current = std::mem::replace(&mut self.state, next);
        self.push_undo(current);
        debug!(revision = self.state.revision, "Redo");
        Some(self.state())
    }

    fn commit(&mut self, next: Arc<QuoteState>) {
        let previous = std::mem::replace(&mut self.state, next);
        self.push_undo(previous);
        self.redo_stack.clear();
    }

    /// Installs a re-keyed snapshot without an undo step of its own.
    ///
    /// Saved ids are carried into every history snapshot, so undo and redo
    /// never bring back a temporary id or forget the quote id. History is cut
    /// at the first snapshot that cannot take the new ids.
    fn commit_server_ids(&mut self, next: Arc<QuoteState>, saved: &SavedQuote) {
        self.state = next;

        let mut undo = VecDeque::with_capacity(self.undo_stack.len());
        while let Some(snapshot) = self.undo_stack.pop_back() {
            match snapshot.with_server_ids(saved, &self.config) {
                Ok(rekeyed) => undo.push_front(Arc::new(rekeyed)),
                Err(err) => {
                    debug!(error = %err, "Undo history cut at saved ids");
                    break;
                }
            }
        }
        self.undo_stack = undo;

        let mut redo = Vec::with_capacity(self.redo_stack.len());
        while let Some(snapshot) = self.redo_stack.pop() {
            match snapshot.with_server_ids(saved, &self.config) {
                Ok(rekeyed) => redo.push(Arc::new(rekeyed)),
                Err(err) => {
                    debug!(error = %err, "Redo history cut at saved ids");
                    break;
                }
            }
        }
        redo.reverse();
        self.redo_stack = redo;
    }

    fn push_undo(&mut self, snapshot: Arc<QuoteState>) {
        let depth = self.config.history.undo_depth;
        if depth == 0 {
            return;
        }
        if self.undo_stack.len() == depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
    }

    fn enter(&mut self, phase: MutationPhase) {
        self.phase = phase;
    }

    fn reject(&mut self, intent: &Intent, err: EngineError) -> EngineError {
        self.enter(MutationPhase::Rejected);
        warn!(
            intent = intent.name(),
            kind = ?err.kind(),
            error = %err,
            "Intent rejected"
        );
        err
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
