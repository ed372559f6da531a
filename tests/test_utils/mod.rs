//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with migrations applied, plus
//! fixture helpers for listings and raw feed records.

use anyhow::Result;
use chrono::{DateTime, Utc};
use lotsync::migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::{Value as JsonValue, json};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Insert a listing row directly for testing.
#[allow(dead_code)]
pub async fn insert_listing(
    db: &DatabaseConnection,
    external_id: i64,
    now: DateTime<Utc>,
) -> Result<lotsync::models::listing::Model> {
    use lotsync::models::listing::ActiveModel;

    let now = now.fixed_offset();
    let listing = ActiveModel {
        external_id: Set(external_id),
        make: Set("Toyota".to_string()),
        model: Set("Corolla".to_string()),
        year: Set(2020),
        price: Set(15000),
        mileage: Set(40000),
        title: Set("2020 Toyota Corolla".to_string()),
        vin: Set(None),
        color: Set(None),
        fuel: Set(None),
        transmission: Set(None),
        lot_number: Set(None),
        image_url: Set(None),
        images: Set(Some(json!(["https://img.example.com/a.jpg"]))),
        condition: Set("good".to_string()),
        is_live: Set(false),
        keys_available: Set(true),
        status: Set("active".to_string()),
        is_active: Set(true),
        is_archived: Set(false),
        archived_at: Set(None),
        archive_reason: Set(None),
        content_hash: Set(format!("hash-{external_id}")),
        last_synced_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    };

    Ok(listing.insert(db).await?)
}

/// A valid raw feed record in the shape the transformer expects.
#[allow(dead_code)]
pub fn raw_record(id: i64) -> JsonValue {
    json!({
        "id": id,
        "manufacturer": {"name": "Toyota"},
        "model": {"name": "Corolla"},
        "year": 2020,
        "vin": format!("JTDBR32E{id:03}0000000"),
        "lots": [{
            "lot": format!("41-{id}"),
            "buy_now": 15000,
            "bid": 13500,
            "odometer": {"mi": 40000},
            "condition": {"name": "good"},
            "keys_available": true,
            "images": {"normal": [format!("https://img.example.com/{id}.jpg")]}
        }]
    })
}

/// A feed page body in the wire shape the client parses.
#[allow(dead_code)]
pub fn feed_page_body(records: Vec<JsonValue>, total: u64, last_page: u64) -> JsonValue {
    json!({
        "data": records,
        "meta": {"total": total, "last_page": last_page}
    })
}
