//! # Hierarchy Index
//!
//! Children-by-parent and root views derived from an [`ItemStore`].
//!
//! The index is rebuilt from scratch after every mutation (trees hold tens to
//! low hundreds of items). Building it is also the structural check: a store
//! that produces an index has no orphans, no cycles and no non-structural
//! parents.
//!
//! ```text
//!   roots:    [c1, c2]
//!   children: c1 ─► [s1, w2]
//!             s1 ─► [w1]
//!   depth:    c1=1  s1=2  w1=3  w2=2  c2=1
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvariantViolation;
use crate::store::ItemStore;
use crate::types::ItemId;

/// Derived, read-only view of the tree structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyIndex {
    roots: Vec<ItemId>,
    children: BTreeMap<ItemId, Vec<ItemId>>,
    depth: BTreeMap<ItemId, usize>,
}

impl HierarchyIndex {
    /// Builds the index, rejecting orphaned parents, non-structural parents
    /// and cycles.
    pub fn build(store: &ItemStore) -> Result<Self, InvariantViolation> {
        for item in store.iter() {
            if let Some(parent_id) = &item.parent_id {
                let parent = store
                    .get(parent_id.as_str())
                    .ok_or_else(|| InvariantViolation::MissingParent {
                        id: item.id.to_string(),
                        parent_id: parent_id.to_string(),
                    })?;
                if !parent.item_type.can_have_children() {
                    return Err(InvariantViolation::ParentNotStructural {
                        parent_id: parent_id.to_string(),
                        parent_type: parent.item_type.to_string(),
                    });
                }
            }
        }

        let mut depth = BTreeMap::new();
        for item in store.iter() {
            depth.insert(item.id.clone(), depth_of(store, &item.id)?);
        }

        let mut roots = Vec::new();
        let mut children: BTreeMap<ItemId, Vec<ItemId>> = BTreeMap::new();
        for item in store.iter() {
            match &item.parent_id {
                Some(parent_id) => children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(item.id.clone()),
                None => roots.push(item.id.clone()),
            }
        }

        let by_position = |a: &ItemId, b: &ItemId| {
            let pa = store.get(a.as_str()).map(|i| i.position);
            let pb = store.get(b.as_str()).map(|i| i.position);
            pa.cmp(&pb).then_with(|| a.cmp(b))
        };
        roots.sort_by(by_position);
        for list in children.values_mut() {
            list.sort_by(by_position);
        }

        Ok(HierarchyIndex {
            roots,
            children,
            depth,
        })
    }

    /// Root items, ordered by position.
    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    /// Direct children of `parent`, ordered by position.
    pub fn children(&self, parent: &str) -> &[ItemId] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, id: &str) -> bool {
        !self.children(id).is_empty()
    }

    /// Depth of an item; roots are at depth 1.
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.depth.get(id).copied()
    }

    /// Deepest level present in the tree (0 when empty).
    pub fn max_depth(&self) -> usize {
        self.depth.values().copied().max().unwrap_or(0)
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<ItemId> {
        let mut out = Vec::new();
        for child in self.children(id) {
            out.push(child.clone());
            out.extend(self.descendants(child.as_str()));
        }
        out
    }

    /// Every item in display order (pre-order by position) with its depth.
    pub fn walk(&self) -> Vec<(ItemId, usize)> {
        let mut out = Vec::with_capacity(self.depth.len());
        for root in &self.roots {
            self.walk_from(root, 1, &mut out);
        }
        out
    }

    fn walk_from(&self, id: &ItemId, depth: usize, out: &mut Vec<(ItemId, usize)>) {
        out.push((id.clone(), depth));
        for child in self.children(id.as_str()) {
            self.walk_from(child, depth + 1, out);
        }
    }

    /// Verifies that every sibling scope is numbered exactly 1..N.
    pub fn check_positions(&self, store: &ItemStore) -> Result<(), InvariantViolation> {
        let scopes = std::iter::once(("root".to_string(), self.roots.as_slice())).chain(
            self.children
                .iter()
                .map(|(parent, list)| (parent.to_string(), list.as_slice())),
        );

        for (parent, siblings) in scopes {
            let positions: Vec<u32> = siblings
                .iter()
                .filter_map(|id| store.get(id.as_str()).map(|i| i.position))
                .collect();
            let contiguous = positions
                .iter()
                .enumerate()
                .all(|(index, position)| *position as usize == index + 1);
            if !contiguous {
                return Err(InvariantViolation::PositionGap { parent, positions });
            }
        }

        Ok(())
    }
}

/// Depth of `id` in the store, failing on a cycle.
fn depth_of(store: &ItemStore, id: &ItemId) -> Result<usize, InvariantViolation> {
    let mut seen = BTreeSet::new();
    let mut depth = 1;
    let mut current = store.get(id.as_str()).and_then(|i| i.parent_id.clone());

    seen.insert(id.clone());
    while let Some(parent) = current {
        if !seen.insert(parent.clone()) {
            return Err(InvariantViolation::Cycle { id: id.to_string() });
        }
        depth += 1;
        current = store.get(parent.as_str()).and_then(|i| i.parent_id.clone());
    }

    Ok(depth)
}

/// Checks that `parent` can accept one more child and returns the child's
/// depth.
///
/// `child` is the id of an existing item being re-attached, if any; the
/// parent chain must not contain it.
pub fn check_attach(
    store: &ItemStore,
    child: Option<&ItemId>,
    parent: &ItemId,
    max_depth: usize,
) -> Result<usize, InvariantViolation> {
    let child_label = child.map(ItemId::to_string).unwrap_or_default();
    let parent_item =
        store
            .get(parent.as_str())
            .ok_or_else(|| InvariantViolation::MissingParent {
                id: child_label.clone(),
                parent_id: parent.to_string(),
            })?;

    if !parent_item.item_type.can_have_children() {
        return Err(InvariantViolation::ParentNotStructural {
            parent_id: parent.to_string(),
            parent_type: parent_item.item_type.to_string(),
        });
    }

    if let Some(child) = child {
        let mut current = Some(parent.clone());
        while let Some(ancestor) = current {
            if &ancestor == child {
                return Err(InvariantViolation::Cycle {
                    id: child.to_string(),
                });
            }
            current = store
                .get(ancestor.as_str())
                .and_then(|i| i.parent_id.clone());
        }
    }

    let depth = depth_of(store, parent)? + 1;
    if depth > max_depth {
        return Err(InvariantViolation::DepthExceeded {
            id: child_label,
            max: max_depth,
        });
    }

    Ok(depth)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, ItemType, VatRate};
    use rust_decimal::Decimal;

    fn item(id: &str, item_type: ItemType, parent: Option<&str>, position: u32) -> Item {
        Item {
            id: ItemId::new(id),
            item_type,
            parent_id: parent.map(ItemId::new),
            position,
            designation: String::new(),
            description: None,
            reference: None,
            unit: None,
            quantity: Decimal::ONE,
            unit_price: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            vat_rate: VatRate::zero(),
            work_id: None,
            margin_percentage: None,
            discount: None,
        }
    }

    fn store(items: Vec<Item>) -> ItemStore {
        ItemStore::from_items(items).unwrap()
    }

    fn ids(list: &[ItemId]) -> Vec<&str> {
        list.iter().map(ItemId::as_str).collect()
    }

    #[test]
    fn test_roots_and_children_ordered() {
        let store = store(vec![
            item("c2", ItemType::Chapter, None, 2),
            item("c1", ItemType::Chapter, None, 1),
            item("w2", ItemType::Work, Some("c1"), 2),
            item("w1", ItemType::Work, Some("c1"), 1),
        ]);
        let index = HierarchyIndex::build(&store).unwrap();

        assert_eq!(ids(index.roots()), vec!["c1", "c2"]);
        assert_eq!(ids(index.children("c1")), vec!["w1", "w2"]);
        assert!(index.has_children("c1"));
        assert!(!index.has_children("c2"));
        assert_eq!(index.depth("w1"), Some(2));
        assert_eq!(index.max_depth(), 2);
    }

    #[test]
    fn test_orphan_rejected() {
        let store = store(vec![item("w1", ItemType::Work, Some("gone"), 1)]);
        assert!(matches!(
            HierarchyIndex::build(&store),
            Err(InvariantViolation::MissingParent { .. })
        ));
    }

    #[test]
    fn test_leaf_parent_rejected() {
        let store = store(vec![
            item("w1", ItemType::Work, None, 1),
            item("w2", ItemType::Work, Some("w1"), 1),
        ]);
        assert!(matches!(
            HierarchyIndex::build(&store),
            Err(InvariantViolation::ParentNotStructural { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let store = store(vec![
            item("s1", ItemType::Section, Some("s2"), 1),
            item("s2", ItemType::Section, Some("s1"), 1),
        ]);
        assert!(matches!(
            HierarchyIndex::build(&store),
            Err(InvariantViolation::Cycle { .. })
        ));
    }

    #[test]
    fn test_walk_is_pre_order() {
        let store = store(vec![
            item("c1", ItemType::Chapter, None, 1),
            item("s1", ItemType::Section, Some("c1"), 1),
            item("w1", ItemType::Work, Some("s1"), 1),
            item("w2", ItemType::Work, Some("c1"), 2),
            item("c2", ItemType::Chapter, None, 2),
        ]);
        let index = HierarchyIndex::build(&store).unwrap();
        let walked = index.walk();
        let walk: Vec<(&str, usize)> = walked
            .iter()
            .map(|(id, depth)| (id.as_str(), *depth))
            .collect();

        assert_eq!(
            walk,
            vec![("c1", 1), ("s1", 2), ("w1", 3), ("w2", 2), ("c2", 1)]
        );
        assert_eq!(ids(&index.descendants("c1")), vec!["s1", "w1", "w2"]);
    }

    #[test]
    fn test_check_positions() {
        let good = store(vec![
            item("c1", ItemType::Chapter, None, 1),
            item("c2", ItemType::Chapter, None, 2),
        ]);
        let index = HierarchyIndex::build(&good).unwrap();
        assert!(index.check_positions(&good).is_ok());

        let gap = store(vec![
            item("c1", ItemType::Chapter, None, 1),
            item("c2", ItemType::Chapter, None, 3),
        ]);
        let index = HierarchyIndex::build(&gap).unwrap();
        assert!(matches!(
            index.check_positions(&gap),
            Err(InvariantViolation::PositionGap { .. })
        ));
    }

    #[test]
    fn test_check_attach() {
        let store = store(vec![
            item("c1", ItemType::Chapter, None, 1),
            item("s1", ItemType::Section, Some("c1"), 1),
            item("w1", ItemType::Work, Some("s1"), 1),
        ]);

        assert_eq!(check_attach(&store, None, &ItemId::new("s1"), 8), Ok(3));
        assert!(matches!(
            check_attach(&store, None, &ItemId::new("w1"), 8),
            Err(InvariantViolation::ParentNotStructural { .. })
        ));
        assert!(matches!(
            check_attach(&store, Some(&ItemId::new("c1")), &ItemId::new("s1"), 8),
            Err(InvariantViolation::Cycle { .. })
        ));
        assert!(matches!(
            check_attach(&store, None, &ItemId::new("s1"), 2),
            Err(InvariantViolation::DepthExceeded { .. })
        ));
        assert!(matches!(
            check_attach(&store, None, &ItemId::new("nope"), 8),
            Err(InvariantViolation::MissingParent { .. })
        ));
    }
}
