//! # Sample Quote Generator
//!
//! Builds a renovation quote through the engine, saves it, and reads it back.
//!
//! ## Usage
//! ```bash
//! cargo run -p devis-db --bin seed
//!
//! # Explicit database / config file
//! cargo run -p devis-db --bin seed -- --db ./devis_dev.db --config ./devis.toml
//!
//! # Engine logs
//! RUST_LOG=devis_core=debug,devis_db=info cargo run -p devis-db --bin seed
//! ```

use devis_core::catalog::{CatalogEntry, CatalogKind, StaticCatalog};
use devis_core::discount::DiscountRequest;
use devis_core::{Intent, ItemId, ItemType, MutationController, NewItem, QuoteMetadata, VatRate};
use devis_db::{AppConfig, Database};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Library entries the sample quote draws from.
fn catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        CatalogEntry {
            id: "W-PLASTER".to_string(),
            kind: CatalogKind::Work,
            designation: "Plasterboard partition".to_string(),
            description: Some("72/48 metal frame, two boards".to_string()),
            reference: Some("PL-72".to_string()),
            unit: Some("m²".to_string()),
            unit_price: Decimal::new(4_850, 2),
            vat_rate: None,
            margin_percentage: Some(Decimal::new(15, 0)),
        },
        CatalogEntry {
            id: "M-PAINT".to_string(),
            kind: CatalogKind::Material,
            designation: "Acrylic paint, white".to_string(),
            description: None,
            reference: Some("AC-10L".to_string()),
            unit: Some("pot".to_string()),
            unit_price: Decimal::new(6_290, 2),
            vat_rate: Some(VatRate::from_percent(10)),
            margin_percentage: None,
        },
        CatalogEntry {
            id: "L-PAINTER".to_string(),
            kind: CatalogKind::Labor,
            designation: "Painter".to_string(),
            description: None,
            reference: None,
            unit: Some("h".to_string()),
            unit_price: Decimal::new(42, 0),
            vat_rate: None,
            margin_percentage: None,
        },
    ])
}

fn build_quote(config: &AppConfig) -> Result<MutationController, Box<dyn std::error::Error>> {
    let mut metadata = QuoteMetadata::new(config.engine.default_vat_rate());
    metadata.number = Some("D-0001".to_string());
    metadata.client_name = Some("Sample client".to_string());
    metadata.issue_date = Some(chrono::Utc::now().date_naive());

    let mut quote = MutationController::new(metadata, config.engine.clone());
    let library = catalog();

    quote.dispatch(Intent::AddItem {
        item: NewItem::chapter("Partitions").with_id("tmp-partitions"),
    })?;
    quote.add_from_catalog(
        &library,
        "W-PLASTER",
        Some(ItemId::new("tmp-partitions")),
        Decimal::new(245, 1),
    )?;

    quote.dispatch(Intent::AddItem {
        item: NewItem::chapter("Painting").with_id("tmp-painting"),
    })?;
    quote.dispatch(Intent::AddItem {
        item: NewItem::section("Living room")
            .with_id("tmp-living")
            .under("tmp-painting"),
    })?;
    quote.add_from_catalog(&library, "M-PAINT", Some(ItemId::new("tmp-living")), Decimal::from(4))?;
    quote.add_from_catalog(&library, "L-PAINTER", Some(ItemId::new("tmp-living")), Decimal::from(16))?;
    quote.dispatch(Intent::AddItem {
        item: NewItem::priced(ItemType::Service, "Site protection", Decimal::ONE, Decimal::from(80))
            .under("tmp-painting")
            .at(1),
    })?;

    quote.dispatch(Intent::ApplyDiscount {
        request: DiscountRequest::percentage(Decimal::from(5)),
    })?;

    Ok(quote)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Devis Sample Quote Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: from config)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = AppConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Devis Sample Quote Generator");
    println!("============================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");

    let mut quote = build_quote(&config)?;
    let state = quote.state();
    println!("✓ Built quote with {} items", state.items().len());

    let saved = db.quotes().bulk_save(&state.save_payload()?).await?;
    println!(
        "✓ Saved quote {} ({} server ids assigned)",
        saved.quote_id,
        saved.assignments.len()
    );

    let state = quote.dispatch(Intent::AssignServerIds { saved: saved.clone() })?;

    println!();
    for row in state.outline() {
        let indent = "  ".repeat(row.depth.saturating_sub(1) as usize);
        println!(
            "{}{:<3} {:<32} {:>12}",
            indent,
            row.item.position,
            row.item.designation,
            row.totals.total_ht.round_dp(2).to_string()
        );
    }

    let document = &state.calculations().document;
    println!();
    for entry in &state.calculations().vat_breakdown {
        println!(
            "VAT {:>6}  base {:>10}  amount {:>10}",
            entry.rate.to_string(),
            entry.base_ht.to_string(),
            entry.vat_amount.to_string()
        );
    }
    println!("Total HT:  {:>10}", document.total_ht.to_string());
    println!("Total VAT: {:>10}", document.total_vat.to_string());
    println!("Total TTC: {:>10}", document.total_ttc.to_string());

    let reopened = db.quotes().open(&saved.quote_id, config.engine.clone()).await?;
    if reopened.state().calculations() == state.calculations() {
        println!("✓ Reloaded quote matches");
    } else {
        println!("⚠ Reloaded quote differs from the saved one");
    }

    db.close().await;
    Ok(())
}
