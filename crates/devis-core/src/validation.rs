//! # Validation Module
//!
//! Field-level rules applied before any intent touches the tree.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Web client form                                              │
//! │  └── Immediate user feedback (format, empty fields)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: MutationController (Rust)                                    │
//! │  └── THIS MODULE: numeric domains, permitted VAT rates, limits         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Structural checks (hierarchy / sequencer)                    │
//! │  └── parents, cycles, contiguous positions                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use devis_core::validation::{validate_quantity, validate_discount_percentage};
//! use rust_decimal::Decimal;
//!
//! assert!(validate_quantity(Decimal::from(5)).is_ok());
//! assert!(validate_discount_percentage(Decimal::from(120)).is_err());
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::types::{DiscountMode, Item, ItemPatch, ItemType, NewItem, VatRate};
use crate::{MAX_DESIGNATION_LENGTH, MAX_QUANTITY, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity: strictly positive, at most [`MAX_QUANTITY`].
pub fn validate_quantity(quantity: Decimal) -> ValidationResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    validate_upper_bound("quantity", quantity, MAX_QUANTITY)
}

/// Validates a unit price: zero is allowed (free line), negative is not.
///
/// Negative amounts enter the quote only through discount items.
pub fn validate_unit_price(unit_price: Decimal) -> ValidationResult<()> {
    if unit_price < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: "unitPrice".to_string(),
        });
    }

    validate_upper_bound("unitPrice", unit_price, MAX_UNIT_PRICE)
}

fn validate_upper_bound(field: &str, value: Decimal, max: i64) -> ValidationResult<()> {
    let max = Decimal::from(max);
    if value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: Decimal::ZERO,
            max,
        });
    }

    Ok(())
}

/// Validates a line discount percentage: within [0, 100].
pub fn validate_discount_percentage(percentage: Decimal) -> ValidationResult<()> {
    validate_percentage_range("discountPercentage", percentage)
}

/// Validates a margin percentage carried by catalog works: within [0, 100].
pub fn validate_margin_percentage(percentage: Decimal) -> ValidationResult<()> {
    validate_percentage_range("marginPercentage", percentage)
}

fn validate_percentage_range(field: &str, percentage: Decimal) -> ValidationResult<()> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: Decimal::ZERO,
            max: Decimal::ONE_HUNDRED,
        });
    }

    Ok(())
}

/// Validates a VAT rate against the configured permitted set.
pub fn validate_vat_rate(rate: VatRate, permitted: &[VatRate]) -> ValidationResult<()> {
    if !permitted.contains(&rate) {
        return Err(ValidationError::NotAllowed {
            field: "vatRate".to_string(),
            allowed: permitted.iter().map(|r| r.to_string()).collect(),
        });
    }

    Ok(())
}

/// Validates a discount request value against its reference total.
///
/// ## Rules
/// - Reference total must be positive (nothing to discount otherwise)
/// - Percentage: (0, 100]
/// - Fixed: > 0 and not above the reference total
pub fn validate_discount_value(
    mode: DiscountMode,
    value: Decimal,
    reference_total: Decimal,
) -> ValidationResult<()> {
    if reference_total <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "referenceTotal".to_string(),
        });
    }

    if value <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "value".to_string(),
        });
    }

    match mode {
        DiscountMode::Percentage if value > Decimal::ONE_HUNDRED => {
            Err(ValidationError::OutOfRange {
                field: "value".to_string(),
                min: Decimal::ZERO,
                max: Decimal::ONE_HUNDRED,
            })
        }
        DiscountMode::Fixed if value > reference_total => Err(ValidationError::ExceedsReference {
            field: "value".to_string(),
            amount: value,
            reference_total,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a designation: optional, at most 500 characters.
pub fn validate_designation(designation: &str) -> ValidationResult<()> {
    if designation.chars().count() > MAX_DESIGNATION_LENGTH {
        return Err(ValidationError::TooLong {
            field: "designation".to_string(),
            max: MAX_DESIGNATION_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that one more item fits in the quote.
pub fn validate_item_count(current_items: usize, max_items: usize) -> ValidationResult<()> {
    if current_items >= max_items {
        return Err(ValidationError::LimitExceeded {
            field: "items".to_string(),
            max: max_items,
        });
    }

    Ok(())
}

// =============================================================================
// Payload Validators
// =============================================================================

/// Validates an add payload.
///
/// Priced fields are only checked for priced leaves; structural items store
/// them as zero. Discount items are created by the discount resolver only.
pub fn validate_new_item(item: &NewItem, permitted: &[VatRate]) -> ValidationResult<()> {
    if item.item_type == ItemType::Discount {
        return Err(ValidationError::NotApplicable {
            field: "type".to_string(),
            item_type: ItemType::Discount.to_string(),
        });
    }

    validate_designation(&item.designation)?;

    if item.item_type.is_priced() {
        validate_quantity(item.quantity)?;
        validate_unit_price(item.unit_price)?;
        validate_discount_percentage(item.discount_percentage)?;
        if let Some(rate) = item.vat_rate {
            validate_vat_rate(rate, permitted)?;
        }
        if let Some(margin) = item.margin_percentage {
            validate_margin_percentage(margin)?;
        }
    }

    if let Some(position) = item.position {
        if position == 0 {
            return Err(ValidationError::MustBePositive {
                field: "position".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a patch against the type of the item it targets.
pub fn validate_patch(
    patch: &ItemPatch,
    item_type: ItemType,
    permitted: &[VatRate],
) -> ValidationResult<()> {
    if let Some(designation) = &patch.designation {
        validate_designation(designation)?;
    }

    if !item_type.is_priced() && patch.touches_pricing() {
        return Err(ValidationError::NotApplicable {
            field: first_pricing_field(patch).to_string(),
            item_type: item_type.to_string(),
        });
    }

    if item_type.is_structural() && patch.vat_rate.is_some() {
        return Err(ValidationError::NotApplicable {
            field: "vatRate".to_string(),
            item_type: item_type.to_string(),
        });
    }

    if let Some(quantity) = patch.quantity {
        validate_quantity(quantity)?;
    }
    if let Some(unit_price) = patch.unit_price {
        validate_unit_price(unit_price)?;
    }
    if let Some(percentage) = patch.discount_percentage {
        validate_discount_percentage(percentage)?;
    }
    if let Some(margin) = patch.margin_percentage {
        validate_margin_percentage(margin)?;
    }
    if let Some(rate) = patch.vat_rate {
        validate_vat_rate(rate, permitted)?;
    }

    Ok(())
}

/// Validates an item read back from storage.
///
/// Priced leaves must satisfy the same field rules as an add. Discount items
/// must carry their resolved details with a positive amount.
pub fn validate_stored_item(item: &Item, permitted: &[VatRate]) -> ValidationResult<()> {
    validate_designation(&item.designation)?;

    if item.is_priced() {
        validate_quantity(item.quantity)?;
        validate_unit_price(item.unit_price)?;
        validate_discount_percentage(item.discount_percentage)?;
        validate_vat_rate(item.vat_rate, permitted)?;
        if let Some(margin) = item.margin_percentage {
            validate_margin_percentage(margin)?;
        }
    }

    if item.is_discount() {
        let details = item.discount.as_ref().ok_or_else(|| ValidationError::Required {
            field: "discount".to_string(),
        })?;
        if details.amount <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "discount.amount".to_string(),
            });
        }
        validate_vat_rate(item.vat_rate, permitted)?;
    }

    Ok(())
}

fn first_pricing_field(patch: &ItemPatch) -> &'static str {
    if patch.quantity.is_some() {
        "quantity"
    } else if patch.unit_price.is_some() {
        "unitPrice"
    } else if patch.discount_percentage.is_some() {
        "discountPercentage"
    } else {
        "marginPercentage"
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
