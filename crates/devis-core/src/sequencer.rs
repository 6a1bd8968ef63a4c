//! # Position Sequencer
//!
//! Keeps `position` unique and contiguous (1..N) inside every sibling scope.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append     [a1 b2 c3] + d        ─►  [a1 b2 c3 d4]   (max + 1)         │
//! │  insert at  [a1 b2 c3] + d @2     ─►  [a1 d2 b3 c4]                     │
//! │  move       [a1 b2 c3 d4] c → 1   ─►  [c1 a2 b3 d4]                     │
//! │  delete     [a1 b2 c3] - b        ─►  [a1 c2]                           │
//! │                                                                         │
//! │  Every operation ends by renumbering the WHOLE scope in final order.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Moves never change `parent_id`.

use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult, ValidationError};
use crate::store::ItemStore;
use crate::types::ItemId;

/// Position for an item appended at the end of `parent`'s scope.
pub fn next_position(store: &ItemStore, parent: Option<&ItemId>) -> u32 {
    store
        .siblings(parent)
        .iter()
        .map(|item| item.position)
        .max()
        .unwrap_or(0)
        + 1
}

/// Places a freshly inserted item inside its scope.
///
/// With no target the item goes after the last sibling. With a target the
/// item takes that slot and later siblings shift down. Returns the final
/// position.
pub fn place(store: &mut ItemStore, id: &str, target: Option<u32>) -> EngineResult<u32> {
    let parent = store.require(id)?.parent_id.clone();

    let mut order: Vec<ItemId> = store
        .siblings(parent.as_ref())
        .iter()
        .filter(|item| item.id.as_str() != id)
        .map(|item| item.id.clone())
        .collect();

    let slot = match target {
        None => {
            let position = next_position_excluding(store, parent.as_ref(), id);
            store.set_position(id, position);
            order.len()
        }
        Some(position) => {
            check_slot(position, order.len() + 1)?;
            position as usize - 1
        }
    };

    order.insert(slot, ItemId::new(id));
    apply_order(store, &order);
    Ok(slot as u32 + 1)
}

/// Moves an item to `new_position` among its current siblings.
pub fn move_to(store: &mut ItemStore, id: &str, new_position: u32) -> EngineResult<()> {
    let parent = store.require(id)?.parent_id.clone();

    let mut order: Vec<ItemId> = store
        .siblings(parent.as_ref())
        .iter()
        .map(|item| item.id.clone())
        .collect();
    check_slot(new_position, order.len())?;

    let from = order
        .iter()
        .position(|sibling| sibling.as_str() == id)
        .ok_or_else(|| EngineError::item_not_found(id))?;
    let moving = order.remove(from);
    order.insert(new_position as usize - 1, moving);

    apply_order(store, &order);
    Ok(())
}

/// Renumbers a scope to 1..N, keeping the current relative order.
pub fn renumber(store: &mut ItemStore, parent: Option<&ItemId>) {
    let order: Vec<ItemId> = store
        .siblings(parent)
        .iter()
        .map(|item| item.id.clone())
        .collect();
    apply_order(store, &order);
}

fn next_position_excluding(store: &ItemStore, parent: Option<&ItemId>, id: &str) -> u32 {
    store
        .siblings(parent)
        .iter()
        .filter(|item| item.id.as_str() != id)
        .map(|item| item.position)
        .max()
        .unwrap_or(0)
        + 1
}

/// Checks that `position` names one of `max` slots (1-based).
pub(crate) fn check_slot(position: u32, max: usize) -> EngineResult<()> {
    if position == 0 || position as usize > max {
        return Err(ValidationError::OutOfRange {
            field: "position".to_string(),
            min: Decimal::ONE,
            max: Decimal::from(max as u64),
        }
        .into());
    }
    Ok(())
}

fn apply_order(store: &mut ItemStore, order: &[ItemId]) {
    for (index, id) in order.iter().enumerate() {
        store.set_position(id.as_str(), index as u32 + 1);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
