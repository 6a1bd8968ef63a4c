//! # Quote Repository
//!
//! Bulk save and load of whole quotes.
//!
//! ## Bulk Save
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── upsert quotes row (metadata + rounded totals in cents)            │
//! │   ├── delete every quote_items row of the quote                         │
//! │   └── insert items in pre-order                                         │
//! │         tmp-… id  → fresh UUID v4, recorded in SavedQuote.assignments   │
//! │         parent_id → already re-keyed (parents precede children)         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Item totals are written for reporting only. Loading never trusts them:
//! the engine recomputes everything from the stored fields.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use devis_core::persistence::{IdAssignment, SavePayload, SavedQuote};
use devis_core::{
    DiscountDetails, DiscountMode, DocumentTotals, EngineConfig, Item, ItemId, ItemType, Money,
    MutationController, QuoteMetadata, VatRate,
};

use crate::error::{DbError, DbResult};

/// A quote as read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedQuote {
    pub metadata: QuoteMetadata,
    /// Display order.
    pub items: Vec<Item>,
    /// Totals as rounded at the last save.
    pub stored_totals: DocumentTotals,
}

/// One row of the quote list.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSummary {
    pub id: String,
    pub number: Option<String>,
    pub client_name: Option<String>,
    pub total_ttc: Money,
    pub updated_at: DateTime<Utc>,
}

/// Repository for quotes and their items.
#[derive(Debug, Clone)]
pub struct QuoteRepository {
    pool: SqlitePool,
}

impl QuoteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        QuoteRepository { pool }
    }

    /// Persists the whole quote in one transaction.
    ///
    /// The quote gets a UUID when its metadata has no id yet. Every item with
    /// a temporary id gets a UUID; the returned [`SavedQuote`] is meant to be
    /// dispatched back as `Intent::AssignServerIds`.
    pub async fn bulk_save(&self, payload: &SavePayload) -> DbResult<SavedQuote> {
        let quote = &payload.quote;
        let quote_id = quote
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        debug!(quote_id = %quote_id, items = payload.items.len(), "Saving quote");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO quotes (
                id, number, client_id, client_name,
                issue_date, validity_days, notes, default_vat_rate_bps,
                total_ht_cents, total_vat_cents, total_ttc_cents, total_discount_cents,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?13
            )
            ON CONFLICT(id) DO UPDATE SET
                number = excluded.number,
                client_id = excluded.client_id,
                client_name = excluded.client_name,
                issue_date = excluded.issue_date,
                validity_days = excluded.validity_days,
                notes = excluded.notes,
                default_vat_rate_bps = excluded.default_vat_rate_bps,
                total_ht_cents = excluded.total_ht_cents,
                total_vat_cents = excluded.total_vat_cents,
                total_ttc_cents = excluded.total_ttc_cents,
                total_discount_cents = excluded.total_discount_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&quote_id)
        .bind(&quote.number)
        .bind(&quote.client_id)
        .bind(&quote.client_name)
        .bind(quote.issue_date)
        .bind(quote.validity_days)
        .bind(&quote.notes)
        .bind(quote.default_vat_rate)
        .bind(payload.document.total_ht.cents())
        .bind(payload.document.total_vat.cents())
        .bind(payload.document.total_ttc.cents())
        .bind(payload.document.total_discount.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM quote_items WHERE quote_id = ?1")
            .bind(&quote_id)
            .execute(&mut *tx)
            .await?;

        let mut assigned: HashMap<&ItemId, ItemId> = HashMap::new();
        let mut assignments = Vec::new();

        for (sort_index, saved) in payload.items.iter().enumerate() {
            let item = &saved.item;

            let id = if item.id.is_temporary() {
                let server_id = ItemId::new(Uuid::new_v4().to_string());
                assignments.push(IdAssignment {
                    temporary_id: item.id.clone(),
                    server_id: server_id.clone(),
                });
                assigned.insert(&item.id, server_id.clone());
                server_id
            } else {
                item.id.clone()
            };

            let parent_id = item
                .parent_id
                .as_ref()
                .map(|parent| assigned.get(parent).cloned().unwrap_or_else(|| parent.clone()));
            let discount = item.discount.as_ref();

            sqlx::query(
                r#"
                INSERT INTO quote_items (
                    id, quote_id, parent_id, item_type, position,
                    designation, description, reference, unit,
                    quantity, unit_price, discount_percentage, vat_rate_bps,
                    work_id, margin_percentage,
                    discount_mode, discount_value, discount_reference_total, discount_amount,
                    total_ht, total_ttc, sort_index
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13,
                    ?14, ?15,
                    ?16, ?17, ?18, ?19,
                    ?20, ?21, ?22
                )
                "#,
            )
            .bind(&id)
            .bind(&quote_id)
            .bind(parent_id)
            .bind(item.item_type)
            .bind(item.position)
            .bind(&item.designation)
            .bind(&item.description)
            .bind(&item.reference)
            .bind(&item.unit)
            .bind(item.quantity.to_string())
            .bind(item.unit_price.to_string())
            .bind(item.discount_percentage.to_string())
            .bind(item.vat_rate)
            .bind(&item.work_id)
            .bind(item.margin_percentage.map(|m| m.to_string()))
            .bind(discount.map(|d| d.mode))
            .bind(discount.map(|d| d.value.to_string()))
            .bind(discount.map(|d| d.reference_total.to_string()))
            .bind(discount.map(|d| d.amount.to_string()))
            .bind(saved.totals.total_ht.to_string())
            .bind(saved.totals.total_ttc.to_string())
            .bind(sort_index as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            quote_id = %quote_id,
            items = payload.items.len(),
            assigned = assignments.len(),
            total_ttc = %payload.document.total_ttc,
            "Quote saved"
        );

        Ok(SavedQuote {
            quote_id,
            assignments,
        })
    }

    /// Reads a quote and its items in display order.
    pub async fn load(&self, quote_id: &str) -> DbResult<LoadedQuote> {
        let header = sqlx::query(
            r#"
            SELECT
                id, number, client_id, client_name,
                issue_date, validity_days, notes, default_vat_rate_bps,
                total_ht_cents, total_vat_cents, total_ttc_cents, total_discount_cents
            FROM quotes
            WHERE id = ?1
            "#,
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Quote", quote_id))?;

        let metadata = QuoteMetadata {
            id: Some(header.try_get("id")?),
            number: header.try_get("number")?,
            client_id: header.try_get("client_id")?,
            client_name: header.try_get("client_name")?,
            issue_date: header.try_get::<Option<NaiveDate>, _>("issue_date")?,
            validity_days: header.try_get("validity_days")?,
            notes: header.try_get("notes")?,
            default_vat_rate: header.try_get::<VatRate, _>("default_vat_rate_bps")?,
        };

        let stored_totals = DocumentTotals {
            total_ht: Money::from_cents(header.try_get("total_ht_cents")?),
            total_vat: Money::from_cents(header.try_get("total_vat_cents")?),
            total_ttc: Money::from_cents(header.try_get("total_ttc_cents")?),
            total_discount: Money::from_cents(header.try_get("total_discount_cents")?),
        };

        let rows = sqlx::query(
            r#"
            SELECT
                id, parent_id, item_type, position,
                designation, description, reference, unit,
                quantity, unit_price, discount_percentage, vat_rate_bps,
                work_id, margin_percentage,
                discount_mode, discount_value, discount_reference_total, discount_amount
            FROM quote_items
            WHERE quote_id = ?1
            ORDER BY sort_index
            "#,
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(item_from_row).collect::<DbResult<Vec<_>>>()?;

        debug!(quote_id = %quote_id, items = items.len(), "Quote loaded");

        Ok(LoadedQuote {
            metadata,
            items,
            stored_totals,
        })
    }

    /// Loads a quote straight into a controller.
    ///
    /// The stored tree goes through the same structural checks as any
    /// in-memory edit, so a tampered database surfaces as `DbError::Engine`.
    pub async fn open(&self, quote_id: &str, config: EngineConfig) -> DbResult<MutationController> {
        let loaded = self.load(quote_id).await?;
        let controller = MutationController::load(loaded.metadata, loaded.items, config)?;
        Ok(controller)
    }

    /// Deletes a quote; its items go with it.
    pub async fn delete(&self, quote_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM quotes WHERE id = ?1")
            .bind(quote_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Quote", quote_id));
        }

        info!(quote_id = %quote_id, "Quote deleted");
        Ok(())
    }

    /// Most recently saved quotes first.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<QuoteSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, number, client_name, total_ttc_cents, updated_at
            FROM quotes
            ORDER BY updated_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DbResult<QuoteSummary> {
                Ok(QuoteSummary {
                    id: row.try_get("id")?,
                    number: row.try_get("number")?,
                    client_name: row.try_get("client_name")?,
                    total_ttc: Money::from_cents(row.try_get("total_ttc_cents")?),
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

fn item_from_row(row: &SqliteRow) -> DbResult<Item> {
    let discount = match row.try_get::<Option<DiscountMode>, _>("discount_mode")? {
        Some(mode) => Some(DiscountDetails {
            mode,
            value: required_decimal(row, "discount_value")?,
            reference_total: required_decimal(row, "discount_reference_total")?,
            amount: required_decimal(row, "discount_amount")?,
        }),
        None => None,
    };

    Ok(Item {
        id: row.try_get("id")?,
        item_type: row.try_get::<ItemType, _>("item_type")?,
        parent_id: row.try_get("parent_id")?,
        position: row.try_get("position")?,
        designation: row.try_get("designation")?,
        description: row.try_get("description")?,
        reference: row.try_get("reference")?,
        unit: row.try_get("unit")?,
        quantity: required_decimal(row, "quantity")?,
        unit_price: required_decimal(row, "unit_price")?,
        discount_percentage: required_decimal(row, "discount_percentage")?,
        vat_rate: row.try_get("vat_rate_bps")?,
        work_id: row.try_get("work_id")?,
        margin_percentage: optional_decimal(row, "margin_percentage")?,
        discount,
    })
}

fn optional_decimal(row: &SqliteRow, column: &str) -> DbResult<Option<Decimal>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|text| Decimal::from_str(&text).map_err(|e| DbError::decode(column, e)))
        .transpose()
}

fn required_decimal(row: &SqliteRow, column: &str) -> DbResult<Decimal> {
    optional_decimal(row, column)?.ok_or_else(|| DbError::decode(column, "unexpected NULL"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use devis_core::discount::DiscountRequest;
    use devis_core::{Intent, NewItem};
    use rust_decimal_macros::dec;

    async fn quotes() -> QuoteRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().quotes()
    }

    fn sample_quote() -> MutationController {
        let mut metadata = QuoteMetadata::new(VatRate::from_percent(20));
        metadata.client_name = Some("Atelier Martin".to_string());
        metadata.issue_date = NaiveDate::from_ymd_opt(2026, 3, 2);

        let mut ctl = MutationController::new(metadata, EngineConfig::default());
        let intents = vec![
            Intent::AddItem {
                item: NewItem::chapter("Masonry").with_id("tmp-c1"),
            },
            Intent::AddItem {
                item: NewItem::section("Walls").with_id("tmp-s1").under("tmp-c1"),
            },
            Intent::AddItem {
                item: NewItem::priced(ItemType::Work, "Block wall", dec!(12.5), dec!(45.20))
                    .with_id("tmp-w1")
                    .under("tmp-s1"),
            },
            Intent::AddItem {
                item: NewItem::priced(ItemType::Product, "Sand", dec!(3), dec!(18))
                    .with_id("tmp-p1")
                    .under("tmp-c1")
                    .with_vat_rate(VatRate::from_percent(10)),
            },
            Intent::ApplyDiscount {
                request: DiscountRequest::percentage(dec!(5)),
            },
        ];
        for intent in intents {
            ctl.dispatch(intent).unwrap();
        }
        ctl
    }

    fn sorted(items: impl IntoIterator<Item = Item>) -> Vec<Item> {
        let mut items: Vec<Item> = items.into_iter().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    #[tokio::test]
    async fn test_bulk_save_assigns_server_ids() {
        let repo = quotes().await;
        let mut ctl = sample_quote();

        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();
        assert_eq!(saved.assignments.len(), 5);
        assert!(saved
            .assignments
            .iter()
            .all(|a| a.temporary_id.is_temporary() && !a.server_id.is_temporary()));

        let state = ctl.dispatch(Intent::AssignServerIds { saved: saved.clone() }).unwrap();
        assert_eq!(state.metadata().id.as_deref(), Some(saved.quote_id.as_str()));
        assert!(state.items().iter().all(|item| !item.id.is_temporary()));

        let loaded = repo.load(&saved.quote_id).await.unwrap();
        assert_eq!(sorted(loaded.items), sorted(state.items().iter().cloned()));
        assert_eq!(loaded.metadata, *state.metadata());
        assert_eq!(loaded.stored_totals, state.calculations().document);
    }

    #[tokio::test]
    async fn test_loaded_items_follow_display_order() {
        let repo = quotes().await;
        let mut ctl = sample_quote();
        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();
        let state = ctl.dispatch(Intent::AssignServerIds { saved: saved.clone() }).unwrap();

        let loaded = repo.load(&saved.quote_id).await.unwrap();
        let outline: Vec<ItemId> = state.outline().into_iter().map(|row| row.item.id).collect();
        let stored: Vec<ItemId> = loaded.items.into_iter().map(|item| item.id).collect();
        assert_eq!(stored, outline);
    }

    #[tokio::test]
    async fn test_resave_keeps_ids_and_updates_header() {
        let repo = quotes().await;
        let mut ctl = sample_quote();
        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();
        ctl.dispatch(Intent::AssignServerIds { saved: saved.clone() }).unwrap();

        let mut metadata = ctl.state().metadata().clone();
        metadata.client_name = Some("Martin & Fils".to_string());
        ctl.dispatch(Intent::UpdateMetadata { metadata }).unwrap();

        let again = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();
        assert_eq!(again.quote_id, saved.quote_id);
        assert!(again.assignments.is_empty());

        let loaded = repo.load(&saved.quote_id).await.unwrap();
        assert_eq!(loaded.metadata.client_name.as_deref(), Some("Martin & Fils"));
        assert_eq!(loaded.items.len(), 5);
        assert_eq!(repo.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_discount_details_survive_round_trip() {
        let repo = quotes().await;
        let ctl = sample_quote();
        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();

        let loaded = repo.load(&saved.quote_id).await.unwrap();
        let discount = loaded.items.iter().find(|item| item.is_discount()).unwrap();
        let details = discount.discount.as_ref().unwrap();

        assert_eq!(details.mode, DiscountMode::Percentage);
        assert_eq!(details.value, dec!(5));
        assert_eq!(discount.parent_id, None);
    }

    #[tokio::test]
    async fn test_open_recomputes_identical_totals() {
        let repo = quotes().await;
        let mut ctl = sample_quote();
        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();
        let state = ctl.dispatch(Intent::AssignServerIds { saved: saved.clone() }).unwrap();

        let reopened = repo.open(&saved.quote_id, EngineConfig::default()).await.unwrap();
        assert_eq!(reopened.state().calculations(), state.calculations());
    }

    fn quote_with_fixed_ids(client: &str) -> MutationController {
        let mut metadata = QuoteMetadata::new(VatRate::from_percent(20));
        metadata.client_name = Some(client.to_string());

        let mut ctl = MutationController::new(metadata, EngineConfig::default());
        ctl.dispatch(Intent::AddItem {
            item: NewItem::chapter("Roof").with_id("c1"),
        })
        .unwrap();
        ctl.dispatch(Intent::AddItem {
            item: NewItem::priced(ItemType::Work, "Tiles", dec!(40), dec!(12))
                .with_id("w1")
                .under("c1"),
        })
        .unwrap();
        ctl
    }

    #[tokio::test]
    async fn test_item_ids_are_scoped_to_their_quote() {
        let repo = quotes().await;
        let first = repo
            .bulk_save(&quote_with_fixed_ids("Dupont").state().save_payload().unwrap())
            .await
            .unwrap();
        let second = repo
            .bulk_save(&quote_with_fixed_ids("Leroy").state().save_payload().unwrap())
            .await
            .unwrap();

        assert_ne!(first.quote_id, second.quote_id);
        assert!(first.assignments.is_empty() && second.assignments.is_empty());

        let loaded = repo.load(&second.quote_id).await.unwrap();
        let ids: Vec<&str> = loaded.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "w1"]);
        assert_eq!(loaded.items[1].parent_id, Some(ItemId::new("c1")));
        assert_eq!(loaded.metadata.client_name.as_deref(), Some("Leroy"));

        repo.delete(&first.quote_id).await.unwrap();
        assert_eq!(repo.load(&second.quote_id).await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_load_unknown_quote() {
        let repo = quotes().await;
        let result = repo.load("missing").await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_cascades_items() {
        let repo = quotes().await;
        let ctl = sample_quote();
        let saved = repo.bulk_save(&ctl.state().save_payload().unwrap()).await.unwrap();

        repo.delete(&saved.quote_id).await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quote_items")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(matches!(
            repo.delete(&saved.quote_id).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
