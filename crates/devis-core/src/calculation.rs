//! # Calculation Engine
//!
//! Pure function from the flat item collection to every derived total.
//!
//! ## Aggregation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        calculate(store)                                 │
//! │                                                                         │
//! │  Priced leaf    HT  = qty × unit_price × (1 - discount% / 100)          │
//! │                 TTC = HT × (1 + vat)                                    │
//! │  Discount leaf  HT/TTC already signed by the resolver                   │
//! │  Chapter        HT/TTC = Σ direct children (recursion covers sections)  │
//! │                                                                         │
//! │  Document       Σ over priced + discount leaves only                    │
//! │                 (structural nodes would count every leaf twice)         │
//! │                                                                         │
//! │  VAT breakdown  group leaves by rate ─► base = Σ HT, vat = base × rate  │
//! │                 sorted ascending by rate                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Precision
//! Per-item and per-section totals stay at full `Decimal` precision. Rounding
//! to cents happens once, when document totals and breakdown entries are
//! turned into [`Money`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::signed_totals;
use crate::error::ValidationError;
use crate::money::Money;
use crate::store::ItemStore;
use crate::types::{Item, ItemId, VatRate};
use crate::validation::ValidationResult;

// =============================================================================
// Result Types
// =============================================================================

/// Unrounded HT/TTC pair of one item or subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemTotals {
    #[serde(rename = "totalHT")]
    #[ts(as = "String")]
    pub total_ht: Decimal,
    #[serde(rename = "totalTTC")]
    #[ts(as = "String")]
    pub total_ttc: Decimal,
}

impl ItemTotals {
    pub fn zero() -> Self {
        ItemTotals::default()
    }

    /// Tax part of the pair.
    pub fn vat(&self) -> Decimal {
        self.total_ttc - self.total_ht
    }
}

/// Rounded totals of the whole quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DocumentTotals {
    #[serde(rename = "totalHT")]
    pub total_ht: Money,
    /// Always `total_ttc - total_ht`, so the three figures add up on paper.
    #[serde(rename = "totalVAT")]
    pub total_vat: Money,
    #[serde(rename = "totalTTC")]
    pub total_ttc: Money,
    /// Positive sum of every discount amount, for display.
    pub total_discount: Money,
}

/// One line of the VAT breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VatBreakdownEntry {
    pub rate: VatRate,
    #[serde(rename = "baseHT")]
    pub base_ht: Money,
    pub vat_amount: Money,
}

/// Everything derived from one item collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Calculations {
    /// Priced and discount leaves.
    pub per_item: BTreeMap<ItemId, ItemTotals>,
    /// Chapters and sections.
    pub per_section: BTreeMap<ItemId, ItemTotals>,
    pub document: DocumentTotals,
    pub vat_breakdown: Vec<VatBreakdownEntry>,
}

impl Calculations {
    /// Totals of any item, leaf or structural.
    pub fn totals(&self, id: &str) -> Option<ItemTotals> {
        self.per_item
            .get(id)
            .or_else(|| self.per_section.get(id))
            .copied()
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Totals of a single leaf. Structural items have no own totals.
///
/// Fails instead of overflowing when the amounts leave the `Decimal` range.
pub fn leaf_totals(item: &Item) -> ValidationResult<ItemTotals> {
    if item.is_priced() {
        let remaining = Decimal::ONE - item.discount_percentage / Decimal::ONE_HUNDRED;
        let total_ht = item
            .quantity
            .checked_mul(item.unit_price)
            .and_then(|gross| gross.checked_mul(remaining))
            .ok_or_else(|| overflow("totalHT"))?;
        let total_ttc = total_ht
            .checked_mul(Decimal::ONE + item.vat_rate.fraction())
            .ok_or_else(|| overflow("totalTTC"))?;
        Ok(ItemTotals {
            total_ht,
            total_ttc,
        })
    } else if let Some(details) = &item.discount {
        let (total_ht, total_ttc) = signed_totals(details, item.vat_rate);
        Ok(ItemTotals {
            total_ht,
            total_ttc,
        })
    } else {
        Ok(ItemTotals::zero())
    }
}

/// Recomputes every derived figure of the collection.
///
/// Deterministic in the collection alone: item order and positions do not
/// affect any total. Amounts too large to total up are reported as
/// [`ValidationError::Overflow`].
pub fn calculate(store: &ItemStore) -> ValidationResult<Calculations> {
    let mut per_item = BTreeMap::new();
    let mut vat_groups: BTreeMap<VatRate, Decimal> = BTreeMap::new();
    let mut document = ItemTotals::zero();
    let mut discounts = Decimal::ZERO;

    for item in store.iter().filter(|item| item.contributes_to_document()) {
        let totals = leaf_totals(item)?;
        let group = vat_groups.entry(item.vat_rate).or_insert(Decimal::ZERO);
        *group = checked_sum(*group, totals.total_ht, "totalHT")?;
        document = ItemTotals {
            total_ht: checked_sum(document.total_ht, totals.total_ht, "totalHT")?,
            total_ttc: checked_sum(document.total_ttc, totals.total_ttc, "totalTTC")?,
        };
        if let Some(details) = &item.discount {
            discounts = checked_sum(discounts, details.amount, "totalDiscount")?;
        }
        per_item.insert(item.id.clone(), totals);
    }

    let mut children: BTreeMap<&str, Vec<&Item>> = BTreeMap::new();
    for item in store.iter() {
        if let Some(parent) = &item.parent_id {
            children.entry(parent.as_str()).or_default().push(item);
        }
    }

    let mut per_section = BTreeMap::new();
    for root in store.iter().filter(|item| item.parent_id.is_none()) {
        subtree_totals(root, &children, &per_item, &mut per_section)?;
    }

    let total_ht = to_money(document.total_ht, "totalHT")?;
    let total_ttc = to_money(document.total_ttc, "totalTTC")?;

    let vat_breakdown = vat_groups
        .into_iter()
        .map(|(rate, base)| {
            Ok(VatBreakdownEntry {
                rate,
                base_ht: to_money(base, "baseHT")?,
                vat_amount: to_money(base * rate.fraction(), "vatAmount")?,
            })
        })
        .collect::<ValidationResult<Vec<_>>>()?;

    Ok(Calculations {
        per_item,
        per_section,
        document: DocumentTotals {
            total_ht,
            total_vat: total_ttc - total_ht,
            total_ttc,
            total_discount: to_money(discounts, "totalDiscount")?,
        },
        vat_breakdown,
    })
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
}

fn checked_sum(acc: Decimal, value: Decimal, field: &str) -> ValidationResult<Decimal> {
    acc.checked_add(value).ok_or_else(|| overflow(field))
}

fn to_money(amount: Decimal, field: &str) -> ValidationResult<Money> {
    Money::checked_from_decimal(amount).ok_or_else(|| overflow(field))
}

/// Post-order walk from a root. Only items reachable from a root are visited,
/// so a corrupted parent chain cannot loop.
fn subtree_totals(
    item: &Item,
    children: &BTreeMap<&str, Vec<&Item>>,
    per_item: &BTreeMap<ItemId, ItemTotals>,
    per_section: &mut BTreeMap<ItemId, ItemTotals>,
) -> ValidationResult<ItemTotals> {
    if !item.is_structural() {
        return Ok(per_item.get(&item.id).copied().unwrap_or_default());
    }

    let mut totals = ItemTotals::zero();
    for child in children.get(item.id.as_str()).into_iter().flatten() {
        let child_totals = subtree_totals(child, children, per_item, per_section)?;
        totals = ItemTotals {
            total_ht: checked_sum(totals.total_ht, child_totals.total_ht, "totalHT")?,
            total_ttc: checked_sum(totals.total_ttc, child_totals.total_ttc, "totalTTC")?,
        };
    }
    per_section.insert(item.id.clone(), totals);
    Ok(totals)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscountDetails, DiscountMode, ItemType};
    use rust_decimal_macros::dec;

    fn node(id: &str, item_type: ItemType, parent: Option<&str>, position: u32) -> Item {
        Item {
            id: ItemId::new(id),
            item_type,
            parent_id: parent.map(ItemId::new),
            position,
            designation: id.to_string(),
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

    fn leaf(
        id: &str,
        parent: &str,
        position: u32,
        quantity: Decimal,
        unit_price: Decimal,
        vat_percent: u32,
    ) -> Item {
        Item {
            quantity,
            unit_price,
            vat_rate: VatRate::from_percent(vat_percent),
            ..node(id, ItemType::Work, Some(parent), position)
        }
    }

    fn three_leaf_chapter() -> ItemStore {
        ItemStore::from_items(vec![
            node("c1", ItemType::Chapter, None, 1),
            leaf("a", "c1", 1, dec!(2), dec!(50), 20),
            leaf("b", "c1", 2, dec!(1), dec!(30), 20),
            leaf("c", "c1", 3, dec!(5), dec!(10), 0),
        ])
        .unwrap()
    }

    #[test]
    fn test_chapter_sums_children() {
        let calc = calculate(&three_leaf_chapter()).unwrap();

        let chapter = calc.totals("c1").unwrap();
        assert_eq!(chapter.total_ht, dec!(180));
        assert_eq!(chapter.total_ttc, dec!(206));

        assert_eq!(calc.document.total_ht, Money::from_cents(18_000));
        assert_eq!(calc.document.total_ttc, Money::from_cents(20_600));
        assert_eq!(calc.document.total_vat, Money::from_cents(2_600));
    }

    #[test]
    fn test_vat_breakdown_sorted_by_rate() {
        let calc = calculate(&three_leaf_chapter()).unwrap();

        assert_eq!(
            calc.vat_breakdown,
            vec![
                VatBreakdownEntry {
                    rate: VatRate::zero(),
                    base_ht: Money::from_cents(5_000),
                    vat_amount: Money::zero(),
                },
                VatBreakdownEntry {
                    rate: VatRate::from_percent(20),
                    base_ht: Money::from_cents(13_000),
                    vat_amount: Money::from_cents(2_600),
                },
            ]
        );
    }

    #[test]
    fn test_line_discount_percentage() {
        let mut item = leaf("a", "c1", 1, dec!(4), dec!(25), 10);
        item.discount_percentage = dec!(15);
        let totals = leaf_totals(&item).unwrap();
        assert_eq!(totals.total_ht, dec!(85));
        assert_eq!(totals.total_ttc, dec!(93.5));
        assert_eq!(totals.vat(), dec!(8.5));
    }

    #[test]
    fn test_nested_sections_propagate() {
        let store = ItemStore::from_items(vec![
            node("c1", ItemType::Chapter, None, 1),
            node("s1", ItemType::Section, Some("c1"), 1),
            node("s2", ItemType::Section, Some("s1"), 1),
            leaf("w1", "s2", 1, dec!(3), dec!(10), 20),
            leaf("w2", "c1", 2, dec!(1), dec!(5), 20),
            node("empty", ItemType::Chapter, None, 2),
        ])
        .unwrap();
        let calc = calculate(&store).unwrap();

        assert_eq!(calc.totals("s2").unwrap().total_ht, dec!(30));
        assert_eq!(calc.totals("s1").unwrap().total_ht, dec!(30));
        assert_eq!(calc.totals("c1").unwrap().total_ht, dec!(35));
        assert_eq!(calc.totals("empty"), Some(ItemTotals::zero()));
        assert_eq!(calc.document.total_ht, Money::from_cents(3_500));
    }

    #[test]
    fn test_discount_leaf_reduces_document() {
        let mut store = three_leaf_chapter();
        store
            .insert(Item {
                vat_rate: VatRate::from_percent(20),
                discount: Some(DiscountDetails {
                    mode: DiscountMode::Fixed,
                    value: dec!(18),
                    reference_total: dec!(180),
                    amount: dec!(18),
                }),
                ..node("d", ItemType::Discount, None, 2)
            })
            .unwrap();
        let calc = calculate(&store).unwrap();

        assert_eq!(calc.totals("d").unwrap().total_ht, dec!(-18));
        assert_eq!(calc.document.total_ht, Money::from_cents(16_200));
        assert_eq!(calc.document.total_discount, Money::from_cents(1_800));
        // 20% group: 130 - 18
        assert_eq!(calc.vat_breakdown[1].base_ht, Money::from_cents(11_200));
    }

    #[test]
    fn test_rounding_only_at_document_level() {
        // Three lines of 0.333... each: rounding per line would give 0.99.
        let store = ItemStore::from_items(vec![
            node("c1", ItemType::Chapter, None, 1),
            leaf("a", "c1", 1, dec!(1), dec!(1) / dec!(3), 0),
            leaf("b", "c1", 2, dec!(1), dec!(1) / dec!(3), 0),
            leaf("c", "c1", 3, dec!(1), dec!(1) / dec!(3), 0),
        ])
        .unwrap();
        let calc = calculate(&store).unwrap();
        assert_eq!(calc.document.total_ht, Money::from_cents(100));
    }

    #[test]
    fn test_overflow_is_reported_not_raised() {
        let big = Decimal::from(10_i64.pow(15));
        let store = ItemStore::from_items(vec![
            node("c1", ItemType::Chapter, None, 1),
            leaf("a", "c1", 1, big, big, 20),
        ])
        .unwrap();

        let err = calculate(&store).unwrap_err();
        assert!(matches!(err, ValidationError::Overflow { .. }));
    }

    #[test]
    fn test_document_total_beyond_money_range() {
        // Each line is representable; the cents total is not.
        let huge = Decimal::from(5 * 10_i64.pow(16));
        let store = ItemStore::from_items(vec![
            node("c1", ItemType::Chapter, None, 1),
            leaf("a", "c1", 1, Decimal::ONE, huge, 0),
            leaf("b", "c1", 2, Decimal::ONE, huge, 0),
        ])
        .unwrap();

        assert_eq!(
            calculate(&store).unwrap_err(),
            ValidationError::Overflow {
                field: "totalHT".to_string()
            }
        );
    }

    #[test]
    fn test_empty_store() {
        let calc = calculate(&ItemStore::new()).unwrap();
        assert_eq!(calc.document, DocumentTotals::default());
        assert!(calc.vat_breakdown.is_empty());
        assert!(calc.per_section.is_empty());
    }
}
