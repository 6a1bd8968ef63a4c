//! # Catalog Collaborator
//!
//! Library of reusable works, materials and labour rates. The engine only
//! looks entries up and turns them into new leaf items; browsing and editing
//! the library is someone else's job.
//!
//! ```text
//!   CatalogEntry.kind      Item.type    VAT rate                 margin
//!   ─────────────────      ─────────    ─────────────────────    ──────
//!   work               ─►  work         prevailing               kept
//!   material           ─►  product      entry's, or prevailing   -
//!   labor              ─►  service      prevailing               -
//! ```

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{ItemId, ItemType, NewItem, VatRate};

/// Kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum CatalogKind {
    Work,
    Material,
    Labor,
}

impl CatalogKind {
    /// Item type a catalog entry of this kind becomes.
    pub const fn item_type(&self) -> ItemType {
        match self {
            CatalogKind::Work => ItemType::Work,
            CatalogKind::Material => ItemType::Product,
            CatalogKind::Labor => ItemType::Service,
        }
    }
}

/// One entry of the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CatalogEntry {
    pub id: String,
    pub kind: CatalogKind,
    pub designation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[ts(as = "String")]
    pub unit_price: Decimal,
    #[serde(default)]
    pub vat_rate: Option<VatRate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub margin_percentage: Option<Decimal>,
}

impl CatalogEntry {
    /// Builds the add payload for this entry.
    ///
    /// The item lands at the end of `parent_id`'s scope.
    pub fn into_new_item(
        self,
        parent_id: Option<ItemId>,
        quantity: Decimal,
        prevailing_rate: VatRate,
    ) -> NewItem {
        let vat_rate = match self.kind {
            CatalogKind::Material => self.vat_rate.unwrap_or(prevailing_rate),
            CatalogKind::Work | CatalogKind::Labor => prevailing_rate,
        };
        let margin_percentage = match self.kind {
            CatalogKind::Work => self.margin_percentage,
            CatalogKind::Material | CatalogKind::Labor => None,
        };

        NewItem {
            id: None,
            item_type: self.kind.item_type(),
            parent_id,
            position: None,
            designation: self.designation,
            description: self.description,
            reference: self.reference,
            unit: self.unit,
            quantity,
            unit_price: self.unit_price,
            discount_percentage: Decimal::ZERO,
            vat_rate: Some(vat_rate),
            work_id: Some(self.id),
            margin_percentage,
        }
    }
}

/// Read access to the library.
pub trait CatalogLookup {
    fn find(&self, id: &str) -> Option<CatalogEntry>;
}

/// In-memory catalog, for tests and for callers that preload the library.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        StaticCatalog {
            entries: entries
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogLookup for StaticCatalog {
    fn find(&self, id: &str) -> Option<CatalogEntry> {
        self.entries.get(id).cloned()
    }
}
