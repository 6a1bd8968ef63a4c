//! # Discount Resolver
//!
//! Turns a discount request into one flat `discount` leaf carrying a
//! negative total.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request { mode, value }      reference = document HT (snapshotted)     │
//! │       │                                                                 │
//! │       ├── Percentage: amount = reference × value / 100   (0 < v ≤ 100)  │
//! │       └── Fixed:      amount = value                     (0 < v ≤ ref)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Item { type: discount,                                                 │
//! │         discount: { mode, value, reference_total, amount } }            │
//! │                                                                         │
//! │  totalHT  = -amount                                                     │
//! │  totalTTC = -amount × (1 + prevailing VAT)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The reference total is frozen in the item. Later edits to the quote do not
//! rescale an existing discount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{DiscountDetails, DiscountMode, Item, ItemId, ItemType, VatRate};
use crate::validation::{validate_designation, validate_discount_value, ValidationResult};

/// Payload of an `ApplyDiscount` intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DiscountRequest {
    #[serde(default)]
    pub id: Option<ItemId>,
    pub mode: DiscountMode,
    #[ts(as = "String")]
    pub value: Decimal,
    /// Label shown on the line; generated from the request when absent.
    #[serde(default)]
    pub designation: Option<String>,
    /// Chapter or section to file the discount under; root when absent.
    #[serde(default)]
    pub parent_id: Option<ItemId>,
}

impl DiscountRequest {
    pub fn percentage(value: Decimal) -> Self {
        DiscountRequest {
            id: None,
            mode: DiscountMode::Percentage,
            value,
            designation: None,
            parent_id: None,
        }
    }

    pub fn fixed(value: Decimal) -> Self {
        DiscountRequest {
            mode: DiscountMode::Fixed,
            ..Self::percentage(value)
        }
    }
}

/// Resolves a request against a snapshotted reference total.
///
/// The returned item has position 0; the sequencer places it.
pub fn resolve(
    request: &DiscountRequest,
    reference_total: Decimal,
    vat_rate: VatRate,
) -> ValidationResult<Item> {
    validate_discount_value(request.mode, request.value, reference_total)?;

    let designation = match &request.designation {
        Some(designation) => {
            validate_designation(designation)?;
            designation.clone()
        }
        None => default_designation(request),
    };

    let amount = match request.mode {
        DiscountMode::Percentage => reference_total * request.value / Decimal::ONE_HUNDRED,
        DiscountMode::Fixed => request.value,
    };

    Ok(Item {
        id: request.id.clone().unwrap_or_else(ItemId::temporary),
        item_type: ItemType::Discount,
        parent_id: request.parent_id.clone(),
        position: 0,
        designation,
        description: None,
        reference: None,
        unit: None,
        quantity: Decimal::ONE,
        unit_price: Decimal::ZERO,
        discount_percentage: Decimal::ZERO,
        vat_rate,
        work_id: None,
        margin_percentage: None,
        discount: Some(DiscountDetails {
            mode: request.mode,
            value: request.value,
            reference_total,
            amount,
        }),
    })
}

/// Signed (HT, TTC) totals of a resolved discount.
pub fn signed_totals(details: &DiscountDetails, vat_rate: VatRate) -> (Decimal, Decimal) {
    let total_ht = -details.amount;
    (total_ht, total_ht * (Decimal::ONE + vat_rate.fraction()))
}

fn default_designation(request: &DiscountRequest) -> String {
    match request.mode {
        DiscountMode::Percentage => format!("Discount {}%", request.value.normalize()),
        DiscountMode::Fixed => "Discount".to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_discount() {
        let request = DiscountRequest::percentage(dec!(10));
        let item = resolve(&request, dec!(1000), VatRate::from_percent(20)).unwrap();

        assert_eq!(item.item_type, ItemType::Discount);
        assert_eq!(item.designation, "Discount 10%");
        assert!(item.id.is_temporary());

        let details = item.discount.as_ref().unwrap();
        assert_eq!(details.amount, dec!(100));
        assert_eq!(details.reference_total, dec!(1000));

        let (ht, ttc) = signed_totals(details, item.vat_rate);
        assert_eq!(ht, dec!(-100));
        assert_eq!(ttc, dec!(-120));
    }

    #[test]
    fn test_fixed_discount() {
        let mut request = DiscountRequest::fixed(dec!(250));
        request.designation = Some("Loyalty".to_string());
        let item = resolve(&request, dec!(1000), VatRate::from_percent(10)).unwrap();

        assert_eq!(item.designation, "Loyalty");
        let (ht, ttc) = signed_totals(item.discount.as_ref().unwrap(), item.vat_rate);
        assert_eq!(ht, dec!(-250));
        assert_eq!(ttc, dec!(-275));
    }

    #[test]
    fn test_fixed_discount_above_reference_rejected() {
        let request = DiscountRequest::fixed(dec!(1000.01));
        let err = resolve(&request, dec!(1000), VatRate::from_percent(20)).unwrap_err();
        assert!(matches!(err, ValidationError::ExceedsReference { .. }));
    }

    #[test]
    fn test_percentage_keeps_full_precision() {
        let request = DiscountRequest::percentage(dec!(7.5));
        let item = resolve(&request, dec!(333.33), VatRate::zero()).unwrap();
        assert_eq!(item.discount.unwrap().amount, dec!(24.99975));
    }
}
