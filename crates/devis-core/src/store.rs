//! # Item Store
//!
//! Flat, keyed collection of line items: the arena the tree lives in.
//!
//! ## Representation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BTreeMap<ItemId, Item>                                                 │
//! │                                                                         │
//! │  "c1" ─► Item { type: chapter, parent: None,     position: 1 }          │
//! │  "s1" ─► Item { type: section, parent: Some(c1), position: 1 }          │
//! │  "w1" ─► Item { type: work,    parent: Some(s1), position: 1 }          │
//! │  "w2" ─► Item { type: work,    parent: Some(s1), position: 2 }          │
//! │                                                                         │
//! │  Parent links are ids, never references. The children-by-parent view   │
//! │  is derived by HierarchyIndex after every mutation.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store applies primitive changes only. Validation happens in the
//! controller before any of these are called.

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult, InvariantViolation};
use crate::types::{Item, ItemId, ItemPatch};

/// Flat collection of items keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemStore {
    items: BTreeMap<ItemId, Item>,
}

impl ItemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        ItemStore::default()
    }

    /// Builds a store from a flat list, rejecting duplicate ids.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self, InvariantViolation> {
        let mut store = ItemStore::new();
        for item in items {
            store.insert(item)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Looks up an item, reporting a stale id as `NotFound`.
    pub fn require(&self, id: &str) -> EngineResult<&Item> {
        self.get(id).ok_or_else(|| EngineError::item_not_found(id))
    }

    /// Iterates in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.keys()
    }

    /// Adds an item. The id must be unused.
    pub fn insert(&mut self, item: Item) -> Result<(), InvariantViolation> {
        if self.items.contains_key(&item.id) {
            return Err(InvariantViolation::DuplicateId {
                id: item.id.to_string(),
            });
        }
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Applies a patch to the descriptive and priced fields of an item.
    pub fn update(&mut self, id: &str, patch: &ItemPatch) -> EngineResult<&Item> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| EngineError::item_not_found(id))?;

        if let Some(designation) = &patch.designation {
            item.designation = designation.clone();
        }
        if let Some(description) = &patch.description {
            item.description = Some(description.clone());
        }
        if let Some(reference) = &patch.reference {
            item.reference = Some(reference.clone());
        }
        if let Some(unit) = &patch.unit {
            item.unit = Some(unit.clone());
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity;
        }
        if let Some(unit_price) = patch.unit_price {
            item.unit_price = unit_price;
        }
        if let Some(percentage) = patch.discount_percentage {
            item.discount_percentage = percentage;
        }
        if let Some(rate) = patch.vat_rate {
            item.vat_rate = rate;
        }
        if let Some(margin) = patch.margin_percentage {
            item.margin_percentage = Some(margin);
        }

        Ok(&*item)
    }

    /// Removes an item and all of its descendants.
    ///
    /// Returns the removed items, the requested one first. Sibling positions
    /// are left as they are; the sequencer closes the gap.
    pub fn remove_cascade(&mut self, id: &str) -> EngineResult<Vec<Item>> {
        if !self.contains(id) {
            return Err(EngineError::item_not_found(id));
        }

        let mut doomed = vec![ItemId::new(id)];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor].clone();
            doomed.extend(
                self.items
                    .values()
                    .filter(|item| item.parent_id.as_ref() == Some(&parent))
                    .map(|item| item.id.clone()),
            );
            cursor += 1;
        }

        Ok(doomed
            .iter()
            .filter_map(|id| self.items.remove(id))
            .collect())
    }

    /// Items whose `parent_id` equals `parent`, ordered by position.
    ///
    /// Ties (only possible mid-mutation) fall back to id order.
    pub fn siblings(&self, parent: Option<&ItemId>) -> Vec<&Item> {
        let mut siblings: Vec<&Item> = self
            .items
            .values()
            .filter(|item| item.parent_id.as_ref() == parent)
            .collect();
        siblings.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        siblings
    }

    /// Overwrites the position of one item.
    pub(crate) fn set_position(&mut self, id: &str, position: u32) {
        if let Some(item) = self.items.get_mut(id) {
            item.position = position;
        }
    }

    /// Consumes the store, returning items in id order.
    pub fn into_items(self) -> Vec<Item> {
        self.items.into_values().collect()
    }

    /// Replaces the id of one item and every `parent_id` pointing at it.
    pub(crate) fn rekey(&mut self, from: &str, to: ItemId) -> EngineResult<()> {
        let mut item = self
            .items
            .remove(from)
            .ok_or_else(|| EngineError::item_not_found(from))?;

        for child in self.items.values_mut() {
            if child.parent_id.as_ref().map(ItemId::as_str) == Some(from) {
                child.parent_id = Some(to.clone());
            }
        }

        item.id = to.clone();
        self.items.insert(to, item);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
