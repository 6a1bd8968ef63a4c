//! # Domain Types
//!
//! Core domain types of the quote line-item tree.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │    ItemType     │   │    VatRate      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id / parent_id │   │  chapter   ┐    │   │  bps (u32)      │       │
//! │  │  position       │   │  section   ┘ structural  2000 = 20%   │       │
//! │  │  quantity       │   │  work      ┐    │   └─────────────────┘       │
//! │  │  unit_price     │   │  product   │ priced leaf                       │
//! │  │  vat_rate       │   │  service   ┘    │   ┌─────────────────┐       │
//! │  │  discount       │   │  discount  signed leaf │ QuoteMetadata │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Totals are never stored on an `Item`: they are derived by
//! [`crate::calculation`] from the flat collection.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// VAT Rate
// =============================================================================

/// VAT rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. 2000 bps = 20%, 550 bps = 5.5%.
/// Integers compare exactly, so rates can key the VAT breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
#[ts(export)]
pub struct VatRate(u32);

impl VatRate {
    /// Creates a VAT rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        VatRate(bps)
    }

    /// Creates a VAT rate from a whole percentage (20 → 20%).
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        VatRate(percent * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (20% → 20).
    pub fn percent(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 2)
    }

    /// Returns the rate as a fraction (20% → 0.2).
    pub fn fraction(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 4)
    }

    /// Zero VAT rate.
    #[inline]
    pub const fn zero() -> Self {
        VatRate(0)
    }
}

impl Default for VatRate {
    fn default() -> Self {
        VatRate::zero()
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent().normalize())
    }
}

// =============================================================================
// Item Identity
// =============================================================================

/// Prefix of client-generated ids that have not been persisted yet.
pub const TEMPORARY_ID_PREFIX: &str = "tmp-";

/// Stable identifier of a line item.
///
/// Client-generated (`tmp-<uuid>`) until the persistence collaborator assigns
/// a server id, see [`crate::persistence`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
#[ts(export)]
pub struct ItemId(String);

impl ItemId {
    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    /// Generates a fresh temporary id.
    pub fn temporary() -> Self {
        ItemId(format!("{}{}", TEMPORARY_ID_PREFIX, Uuid::new_v4()))
    }

    /// True until the item has been re-keyed to a server id.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        ItemId(id)
    }
}

// =============================================================================
// Item Type
// =============================================================================

/// The kind of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ItemType {
    /// Top-level grouping node.
    Chapter,
    /// Nested grouping node.
    Section,
    /// Labour + material work unit from the catalog.
    Work,
    /// Material.
    Product,
    /// Labour.
    Service,
    /// Signed pseudo-item produced by the discount resolver.
    Discount,
}

impl ItemType {
    /// Chapters and sections: totals are sums of their children.
    pub const fn is_structural(&self) -> bool {
        matches!(self, ItemType::Chapter | ItemType::Section)
    }

    /// Work, product and service: totals come from quantity × price.
    pub const fn is_priced(&self) -> bool {
        matches!(self, ItemType::Work | ItemType::Product | ItemType::Service)
    }

    pub const fn is_discount(&self) -> bool {
        matches!(self, ItemType::Discount)
    }

    pub const fn can_have_children(&self) -> bool {
        self.is_structural()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemType::Chapter => "chapter",
            ItemType::Section => "section",
            ItemType::Work => "work",
            ItemType::Product => "product",
            ItemType::Service => "service",
            ItemType::Discount => "discount",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapter" => Ok(ItemType::Chapter),
            "section" => Ok(ItemType::Section),
            "work" => Ok(ItemType::Work),
            "product" => Ok(ItemType::Product),
            "service" => Ok(ItemType::Service),
            "discount" => Ok(ItemType::Discount),
            _ => Err(ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: [
                    "chapter", "section", "work", "product", "service", "discount",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            }),
        }
    }
}

// =============================================================================
// Discount Details
// =============================================================================

/// How a discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DiscountMode {
    /// `value` percent of the reference total.
    Percentage,
    /// `value` currency units, capped by the reference total.
    Fixed,
}

/// Frozen inputs and result of a discount resolution.
///
/// `reference_total` is the document HT total at the moment the discount
/// was created. It is not re-derived when the quote changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DiscountDetails {
    pub mode: DiscountMode,
    #[ts(as = "String")]
    pub value: Decimal,
    #[ts(as = "String")]
    pub reference_total: Decimal,
    /// Positive amount removed from the HT total.
    #[ts(as = "String")]
    pub amount: Decimal,
}

// =============================================================================
// Item
// =============================================================================

/// A node of the quote tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Item {
    pub id: ItemId,

    #[serde(rename = "type")]
    pub item_type: ItemType,

    /// Owning chapter/section. `None` for root items.
    #[serde(default)]
    pub parent_id: Option<ItemId>,

    /// 1-based rank among siblings sharing `parent_id`.
    pub position: u32,

    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    #[ts(as = "String")]
    pub quantity: Decimal,
    #[serde(default)]
    #[ts(as = "String")]
    pub unit_price: Decimal,
    #[serde(default)]
    #[ts(as = "String")]
    pub discount_percentage: Decimal,
    #[serde(default)]
    pub vat_rate: VatRate,

    /// Catalog entry this item was created from.
    #[serde(default)]
    pub work_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub margin_percentage: Option<Decimal>,

    /// Set on `discount` items only.
    #[serde(default)]
    pub discount: Option<DiscountDetails>,
}

impl Item {
    pub fn is_structural(&self) -> bool {
        self.item_type.is_structural()
    }

    pub fn is_priced(&self) -> bool {
        self.item_type.is_priced()
    }

    pub fn is_discount(&self) -> bool {
        self.item_type.is_discount()
    }

    /// Priced leaves and discounts: the items document totals are summed over.
    pub fn contributes_to_document(&self) -> bool {
        self.is_priced() || self.is_discount()
    }
}

// =============================================================================
// Add / Update Payloads
// =============================================================================

/// Payload of an `AddItem` intent.
///
/// ## Builder Usage
/// ```rust
/// use devis_core::types::{ItemType, NewItem, VatRate};
/// use rust_decimal::Decimal;
///
/// let chapter = NewItem::chapter("Masonry").with_id("c1");
/// let wall = NewItem::priced(ItemType::Work, "Block wall", Decimal::from(12), Decimal::from(45))
///     .with_vat_rate(VatRate::from_percent(20))
///     .under("c1");
/// assert_eq!(wall.parent_id.unwrap().as_str(), "c1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewItem {
    /// Caller-supplied id; a temporary id is generated when absent.
    #[serde(default)]
    pub id: Option<ItemId>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    /// Target slot; appended after the last sibling when absent.
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_quantity")]
    #[ts(as = "String")]
    pub quantity: Decimal,
    #[serde(default)]
    #[ts(as = "String")]
    pub unit_price: Decimal,
    #[serde(default)]
    #[ts(as = "String")]
    pub discount_percentage: Decimal,
    /// Falls back to the quote's prevailing rate when absent.
    #[serde(default)]
    pub vat_rate: Option<VatRate>,
    #[serde(default)]
    pub work_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub margin_percentage: Option<Decimal>,
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

impl NewItem {
    fn blank(item_type: ItemType, designation: impl Into<String>) -> Self {
        NewItem {
            id: None,
            item_type,
            parent_id: None,
            position: None,
            designation: designation.into(),
            description: None,
            reference: None,
            unit: None,
            quantity: default_quantity(),
            unit_price: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            vat_rate: None,
            work_id: None,
            margin_percentage: None,
        }
    }

    /// A chapter (root-level grouping by default).
    pub fn chapter(designation: impl Into<String>) -> Self {
        Self::blank(ItemType::Chapter, designation)
    }

    /// A section (nested grouping).
    pub fn section(designation: impl Into<String>) -> Self {
        Self::blank(ItemType::Section, designation)
    }

    /// A priced leaf (`work`, `product` or `service`).
    pub fn priced(
        item_type: ItemType,
        designation: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        NewItem {
            quantity,
            unit_price,
            ..Self::blank(item_type, designation)
        }
    }

    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn under(mut self, parent_id: impl Into<ItemId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn at(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_vat_rate(mut self, vat_rate: VatRate) -> Self {
        self.vat_rate = Some(vat_rate);
        self
    }

    pub fn with_discount_percentage(mut self, discount_percentage: Decimal) -> Self {
        self.discount_percentage = discount_percentage;
        self
    }
}

/// Partial update of an existing item.
///
/// Structure (`parent_id`, `position`, `type`) is not patchable: it changes
/// only through add, remove and move intents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemPatch {
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub discount_percentage: Option<Decimal>,
    #[serde(default)]
    pub vat_rate: Option<VatRate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub margin_percentage: Option<Decimal>,
}

impl ItemPatch {
    /// True when the patch touches a field that drives totals.
    pub fn touches_pricing(&self) -> bool {
        self.quantity.is_some()
            || self.unit_price.is_some()
            || self.discount_percentage.is_some()
            || self.margin_percentage.is_some()
    }
}

// =============================================================================
// Quote Metadata
// =============================================================================

/// Document-level data of a quote (the item tree lives in the snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuoteMetadata {
    /// Server id, once persisted.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub issue_date: Option<NaiveDate>,
    /// Days the offer stays valid after `issue_date`.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default)]
    pub notes: Option<String>,
    /// Rate used for discounts and for items added without one.
    pub default_vat_rate: VatRate,
}

fn default_validity_days() -> u32 {
    30
}

impl QuoteMetadata {
    /// Empty metadata with the given prevailing VAT rate.
    pub fn new(default_vat_rate: VatRate) -> Self {
        QuoteMetadata {
            id: None,
            number: None,
            client_id: None,
            client_name: None,
            issue_date: None,
            validity_days: default_validity_days(),
            notes: None,
            default_vat_rate,
        }
    }

    /// Last day the offer is valid, when an issue date is set.
    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.issue_date
            .and_then(|date| date.checked_add_days(Days::new(u64::from(self.validity_days))))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_vat_rate_conversions() {
        let rate = VatRate::from_percent(20);
        assert_eq!(rate.bps(), 2000);
        assert_eq!(rate.percent(), dec!(20));
        assert_eq!(rate.fraction(), dec!(0.2));
        assert_eq!(rate.to_string(), "20%");
        assert_eq!(VatRate::from_bps(550).to_string(), "5.5%");
    }

    #[test]
    fn test_temporary_ids() {
        let id = ItemId::temporary();
        assert!(id.is_temporary());
        assert_ne!(id, ItemId::temporary());
        assert!(!ItemId::new("42").is_temporary());
    }

    #[test]
    fn test_item_type_predicates() {
        assert!(ItemType::Chapter.is_structural());
        assert!(ItemType::Section.can_have_children());
        assert!(ItemType::Service.is_priced());
        assert!(!ItemType::Discount.is_priced());
        assert!(!ItemType::Discount.can_have_children());
        assert_eq!("product".parse::<ItemType>().unwrap(), ItemType::Product);
        assert!("folder".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_item_json_shape() {
        let json = r#"{
            "id": "w1",
            "type": "work",
            "parentId": "c1",
            "position": 1,
            "designation": "Block wall",
            "quantity": "2",
            "unitPrice": "50",
            "vatRate": 2000
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_type, ItemType::Work);
        assert_eq!(item.parent_id, Some(ItemId::new("c1")));
        assert_eq!(item.unit_price, dec!(50));
        assert_eq!(item.discount_percentage, Decimal::ZERO);
        assert_eq!(item.vat_rate, VatRate::from_percent(20));
    }

    #[test]
    fn test_valid_until() {
        let mut meta = QuoteMetadata::new(VatRate::from_percent(20));
        assert_eq!(meta.valid_until(), None);

        meta.issue_date = NaiveDate::from_ymd_opt(2026, 1, 15);
        assert_eq!(meta.valid_until(), NaiveDate::from_ymd_opt(2026, 2, 14));
    }

    #[test]
    fn test_new_item_defaults() {
        let item: NewItem = serde_json::from_str(r#"{"type": "service"}"#).unwrap();
        assert_eq!(item.quantity, Decimal::ONE);
        assert!(item.vat_rate.is_none());
        assert!(item.position.is_none());
    }
}
