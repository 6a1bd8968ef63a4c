//! # Persistence Collaborator
//!
//! Payload types of the bulk save and the re-keying of temporary ids once
//! the save returns.
//!
//! ## Round Trip
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QuoteState ──save_payload()──► SavePayload { quote, document, items }  │
//! │                                        │                                │
//! │                                        ▼  (devis-db, one transaction)   │
//! │                                 SavedQuote { quote_id,                  │
//! │                                              assignments: [tmp ─► id] } │
//! │                                        │                                │
//! │  QuoteState ◄──AssignServerIds────────┘                                 │
//! │    ids and parent_id links replaced; positions and shape untouched      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::calculation::{Calculations, DocumentTotals, ItemTotals};
use crate::error::{EngineError, EngineResult, InvariantViolation};
use crate::hierarchy::HierarchyIndex;
use crate::store::ItemStore;
use crate::types::{Item, ItemId, QuoteMetadata};

// =============================================================================
// Payloads
// =============================================================================

/// One item as sent to the persistence collaborator, with its totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaveItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(flatten)]
    pub totals: ItemTotals,
}

/// Bulk-save request: metadata plus the whole tree in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SavePayload {
    pub quote: QuoteMetadata,
    pub document: DocumentTotals,
    /// Pre-order: every parent precedes its children.
    pub items: Vec<SaveItem>,
}

impl SavePayload {
    /// Builds the payload from a consistent tree.
    pub fn build(
        quote: &QuoteMetadata,
        store: &ItemStore,
        calculations: &Calculations,
    ) -> Result<Self, InvariantViolation> {
        let index = HierarchyIndex::build(store)?;

        let items = index
            .walk()
            .into_iter()
            .filter_map(|(id, _)| store.get(id.as_str()))
            .map(|item| SaveItem {
                item: item.clone(),
                totals: calculations.totals(item.id.as_str()).unwrap_or_default(),
            })
            .collect();

        Ok(SavePayload {
            quote: quote.clone(),
            document: calculations.document,
            items,
        })
    }

    /// Items still carrying a client-generated id.
    pub fn temporary_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items
            .iter()
            .map(|saved| &saved.item.id)
            .filter(|id| id.is_temporary())
    }
}

/// Server id given to one client-temporary item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct IdAssignment {
    pub temporary_id: ItemId,
    pub server_id: ItemId,
}

/// Bulk-save response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SavedQuote {
    pub quote_id: String,
    pub assignments: Vec<IdAssignment>,
}

// =============================================================================
// Re-keying
// =============================================================================

/// Checks that `assignments` can be applied to `store` in order: every
/// temporary id is live when its turn comes and no server id is taken.
pub fn check_assignments(store: &ItemStore, assignments: &[IdAssignment]) -> EngineResult<()> {
    let mut live: BTreeSet<&str> = store.ids().map(ItemId::as_str).collect();

    for assignment in assignments {
        if assignment.temporary_id == assignment.server_id {
            continue;
        }
        if !live.remove(assignment.temporary_id.as_str()) {
            return Err(EngineError::item_not_found(assignment.temporary_id.as_str()));
        }
        if !live.insert(assignment.server_id.as_str()) {
            return Err(InvariantViolation::IdCollision {
                server_id: assignment.server_id.to_string(),
            }
            .into());
        }
    }

    Ok(())
}

/// Returns a copy of `store` with every assigned temporary id replaced.
///
/// Children follow their parent's new id. Positions do not change. Fails
/// without touching `store` when a temporary id is unknown or a server id
/// is already taken.
pub fn rekey_items(store: &ItemStore, assignments: &[IdAssignment]) -> EngineResult<ItemStore> {
    check_assignments(store, assignments)?;

    let mut rekeyed = store.clone();
    for assignment in assignments {
        if assignment.temporary_id != assignment.server_id {
            rekeyed.rekey(
                assignment.temporary_id.as_str(),
                assignment.server_id.clone(),
            )?;
        }
    }

    Ok(rekeyed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::calculate;
    use crate::types::{ItemType, VatRate};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn item(id: &str, item_type: ItemType, parent: Option<&str>, position: u32) -> Item {
        Item {
            id: ItemId::new(id),
            item_type,
            parent_id: parent.map(ItemId::new),
            position,
            designation: id.to_string(),
            description: None,
            reference: None,
            unit: None,
            quantity: dec!(2),
            unit_price: dec!(10),
            discount_percentage: Decimal::ZERO,
            vat_rate: VatRate::from_percent(20),
            work_id: None,
            margin_percentage: None,
            discount: None,
        }
    }

    fn sample() -> ItemStore {
        ItemStore::from_items(vec![
            item("tmp-c1", ItemType::Chapter, None, 1),
            item("tmp-w1", ItemType::Work, Some("tmp-c1"), 1),
            item("tmp-w2", ItemType::Work, Some("tmp-c1"), 2),
            item("7", ItemType::Chapter, None, 2),
        ])
        .unwrap()
    }

    fn assign(temporary: &str, server: &str) -> IdAssignment {
        IdAssignment {
            temporary_id: ItemId::new(temporary),
            server_id: ItemId::new(server),
        }
    }

    #[test]
    fn test_payload_is_pre_order_with_totals() {
        let store = sample();
        let calc = calculate(&store).unwrap();
        let payload =
            SavePayload::build(&QuoteMetadata::new(VatRate::from_percent(20)), &store, &calc)
                .unwrap();

        let ids: Vec<&str> = payload.items.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, vec!["tmp-c1", "tmp-w1", "tmp-w2", "7"]);
        assert_eq!(payload.items[0].totals.total_ht, dec!(40));
        assert_eq!(payload.temporary_ids().count(), 3);
    }

    #[test]
    fn test_payload_json_is_flat() {
        let store = sample();
        let calc = calculate(&store).unwrap();
        let payload =
            SavePayload::build(&QuoteMetadata::new(VatRate::zero()), &store, &calc).unwrap();
        let json = serde_json::to_value(&payload.items[1]).unwrap();
        assert_eq!(json["type"], "work");
        assert_eq!(json["parentId"], "tmp-c1");
        let amount = |key: &str| json[key].as_str().unwrap().parse::<Decimal>().unwrap();
        assert_eq!(amount("totalHT"), dec!(20));
        assert_eq!(amount("totalTTC"), dec!(24));
    }

    #[test]
    fn test_rekey_preserves_shape() {
        let store = sample();
        let rekeyed = rekey_items(
            &store,
            &[assign("tmp-c1", "10"), assign("tmp-w1", "11"), assign("tmp-w2", "12")],
        )
        .unwrap();

        assert_eq!(rekeyed.len(), 4);
        assert_eq!(rekeyed.get("11").unwrap().parent_id, Some(ItemId::new("10")));
        assert_eq!(rekeyed.get("12").unwrap().position, 2);
        assert_eq!(
            calculate(&rekeyed).unwrap().document,
            calculate(&store).unwrap().document
        );
    }

    #[test]
    fn test_rekey_unknown_id() {
        let err = rekey_items(&sample(), &[assign("tmp-ghost", "10")]).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_rekey_collision() {
        let err = rekey_items(&sample(), &[assign("tmp-w1", "7")]).unwrap_err();
        assert_eq!(
            err,
            EngineError::Invariant(InvariantViolation::IdCollision {
                server_id: "7".to_string()
            })
        );
    }
}
