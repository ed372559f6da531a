//! Raw feed record validation and transformation.
//!
//! [`transform`] is a pure function from one raw feed record to the
//! canonical internal representation. Malformed records produce a list of
//! human-readable validation errors instead of aborting, so callers can
//! aggregate failures per batch without losing valid siblings.

use serde_json::Value as JsonValue;

use crate::feed::extract::{bool_at, number_at, string_at, string_list_at};
use crate::models::listing::{ListingCondition, ListingStatus};

/// Price ceiling; records priced above this are rejected as feed noise.
pub const MAX_PRICE: i64 = 10_000_000;

/// Mileage ceiling; records above this are rejected as feed noise.
pub const MAX_MILEAGE: i64 = 1_000_000;

/// Oldest accepted model year.
pub const MIN_YEAR: i32 = 1900;

/// Canonical, validated representation of one feed record.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalListing {
    pub external_id: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    /// Max of buy-now and current bid, clamped to >= 0. Zero means unpriced.
    pub price: i64,
    pub mileage: i32,
    pub title: String,
    pub vin: Option<String>,
    pub color: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub lot_number: Option<String>,
    pub image_url: Option<String>,
    pub images: Vec<String>,
    pub condition: ListingCondition,
    pub is_live: bool,
    pub keys_available: bool,
    pub status: ListingStatus,
}

const ID_PATHS: &[&str] = &["id", "car_id", "lots.0.id"];
const MAKE_PATHS: &[&str] = &["manufacturer.name", "make", "brand"];
const MODEL_PATHS: &[&str] = &["model.name", "model"];
const YEAR_PATHS: &[&str] = &["year", "lots.0.year", "specs.year"];
const BUY_NOW_PATHS: &[&str] = &["lots.0.buy_now", "lots.0.buy_now_price", "buy_now"];
const BID_PATHS: &[&str] = &["lots.0.bid", "lots.0.current_bid", "current_bid", "final_bid"];
const LOT_PRICE_PATHS: &[&str] = &["lots.0.price", "price"];
const MILEAGE_PATHS: &[&str] = &["lots.0.odometer.mi", "odometer.mi", "odometer", "mileage"];
const TITLE_PATHS: &[&str] = &["title", "lots.0.title"];
const VIN_PATHS: &[&str] = &["vin", "lots.0.vin"];
const COLOR_PATHS: &[&str] = &["color.name", "color"];
const FUEL_PATHS: &[&str] = &["fuel.name", "engine.fuel", "fuel"];
const TRANSMISSION_PATHS: &[&str] = &["transmission.name", "transmission"];
const LOT_NUMBER_PATHS: &[&str] = &["lots.0.lot", "lot_number"];
const IMAGE_PATHS: &[&str] = &["lots.0.images.normal.0", "lots.0.images.big.0", "image"];
const IMAGE_LIST_PATHS: &[&str] = &["lots.0.images.normal", "lots.0.images.big", "images"];
const CONDITION_PATHS: &[&str] = &["lots.0.condition.name", "condition"];
const IS_LIVE_PATHS: &[&str] = &["lots.0.is_live", "is_live"];
const KEYS_PATHS: &[&str] = &["lots.0.keys_available", "keys_available", "keys"];
const STATUS_PATHS: &[&str] = &["lots.0.status.name", "status"];

/// Transform one raw feed record into a [`CanonicalListing`].
///
/// Pure, no I/O. `current_year` bounds the year check (accepted range is
/// `[1900, current_year + 2]` to admit next-model-year listings).
pub fn transform(raw: &JsonValue, current_year: i32) -> Result<CanonicalListing, Vec<String>> {
    let mut errors = Vec::new();

    let external_id = match number_at(raw, ID_PATHS) {
        Some(id) if id > 0.0 => Some(id as i64),
        _ => {
            errors.push("Missing car ID".to_string());
            None
        }
    };

    let make = string_at(raw, MAKE_PATHS);
    if make.is_none() {
        errors.push("Missing manufacturer name".to_string());
    }

    let model = string_at(raw, MODEL_PATHS);
    if model.is_none() {
        errors.push("Missing model name".to_string());
    }

    let year = number_at(raw, YEAR_PATHS).map(|y| y as i32).unwrap_or(0);
    if !(MIN_YEAR..=current_year + 2).contains(&year) {
        errors.push(format!("Invalid year: {}", year));
    }

    let buy_now = number_at(raw, BUY_NOW_PATHS);
    let bid = number_at(raw, BID_PATHS);
    let price = match (buy_now, bid) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => number_at(raw, LOT_PRICE_PATHS).unwrap_or(0.0),
    };
    let price = price.max(0.0) as i64;
    if price > MAX_PRICE {
        errors.push(format!("Invalid price: {}", price));
    }

    let mileage = number_at(raw, MILEAGE_PATHS).unwrap_or(0.0).max(0.0) as i64;
    if mileage > MAX_MILEAGE {
        errors.push(format!("Invalid mileage: {}", mileage));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Unwraps are guarded by the error checks above.
    let external_id = external_id.expect("validated");
    let make = make.expect("validated");
    let model = model.expect("validated");

    let title = string_at(raw, TITLE_PATHS)
        .unwrap_or_else(|| format!("{} {} {}", year, make, model));

    let status = match string_at(raw, STATUS_PATHS).as_deref() {
        Some("sold") => ListingStatus::Sold,
        _ => ListingStatus::Active,
    };

    Ok(CanonicalListing {
        external_id,
        make,
        model,
        year,
        price,
        mileage: mileage as i32,
        title,
        vin: string_at(raw, VIN_PATHS),
        color: string_at(raw, COLOR_PATHS),
        fuel: string_at(raw, FUEL_PATHS),
        transmission: string_at(raw, TRANSMISSION_PATHS),
        lot_number: string_at(raw, LOT_NUMBER_PATHS),
        image_url: string_at(raw, IMAGE_PATHS),
        images: string_list_at(raw, IMAGE_LIST_PATHS),
        condition: string_at(raw, CONDITION_PATHS)
            .map(|c| ListingCondition::parse(&c))
            .unwrap_or_default(),
        is_live: bool_at(raw, IS_LIVE_PATHS).unwrap_or(false),
        keys_available: bool_at(raw, KEYS_PATHS).unwrap_or(false),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YEAR: i32 = 2026;

    fn valid_record() -> JsonValue {
        json!({
            "id": 42001,
            "manufacturer": {"name": "Tesla"},
            "model": {"name": "Model 3"},
            "year": 2022,
            "vin": "5YJ3E1EA7NF000001",
            "lots": [{
                "lot": "77-1234",
                "buy_now": 20000,
                "bid": 18000,
                "odometer": {"mi": 30000},
                "condition": {"name": "good"},
                "keys_available": true,
                "images": {"normal": ["https://img.example.com/1.jpg"]}
            }]
        })
    }

    #[test]
    fn valid_record_transforms() {
        let listing = transform(&valid_record(), YEAR).unwrap();
        assert_eq!(listing.external_id, 42001);
        assert_eq!(listing.make, "Tesla");
        assert_eq!(listing.model, "Model 3");
        assert_eq!(listing.year, 2022);
        assert_eq!(listing.mileage, 30000);
        assert_eq!(listing.lot_number.as_deref(), Some("77-1234"));
        assert!(listing.keys_available);
        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(
            listing.image_url.as_deref(),
            Some("https://img.example.com/1.jpg")
        );
    }

    #[test]
    fn price_is_max_of_buy_now_and_bid() {
        let listing = transform(&valid_record(), YEAR).unwrap();
        assert_eq!(listing.price, 20000);
    }

    #[test]
    fn price_falls_back_to_bid_when_buy_now_missing() {
        let record = json!({
            "id": 1,
            "manufacturer": {"name": "Ford"},
            "model": {"name": "F-150"},
            "year": 2020,
            "final_bid": 12000
        });
        let listing = transform(&record, YEAR).unwrap();
        assert_eq!(listing.price, 12000);
    }

    #[test]
    fn malformed_record_aggregates_errors() {
        let record = json!({
            "id": null,
            "manufacturer": {"name": "Tesla"},
            "model": {"name": null},
            "year": 1800
        });
        let errors = transform(&record, YEAR).unwrap_err();
        assert!(errors.contains(&"Missing car ID".to_string()));
        assert!(errors.contains(&"Missing model name".to_string()));
        assert!(errors.contains(&"Invalid year: 1800".to_string()));
        assert!(!errors.contains(&"Missing manufacturer name".to_string()));
    }

    #[test]
    fn year_bounds_are_inclusive_of_next_model_years() {
        let mut record = valid_record();
        record["year"] = json!(YEAR + 2);
        assert!(transform(&record, YEAR).is_ok());

        record["year"] = json!(YEAR + 3);
        assert!(transform(&record, YEAR).is_err());

        record["year"] = json!(1900);
        assert!(transform(&record, YEAR).is_ok());

        record["year"] = json!(1899);
        assert!(transform(&record, YEAR).is_err());
    }

    #[test]
    fn absurd_price_is_rejected() {
        let mut record = valid_record();
        record["lots"][0]["buy_now"] = json!(10_000_001);
        let errors = transform(&record, YEAR).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("Invalid price")));
    }

    #[test]
    fn absurd_mileage_is_rejected_but_negative_clamps() {
        let mut record = valid_record();
        record["lots"][0]["odometer"]["mi"] = json!(1_000_001);
        assert!(transform(&record, YEAR).is_err());

        record["lots"][0]["odometer"]["mi"] = json!(-500);
        let listing = transform(&record, YEAR).unwrap();
        assert_eq!(listing.mileage, 0);
    }

    #[test]
    fn unpriced_record_derives_zero_not_error() {
        let record = json!({
            "id": 7,
            "manufacturer": {"name": "Honda"},
            "model": {"name": "Civic"},
            "year": 2019
        });
        let listing = transform(&record, YEAR).unwrap();
        assert_eq!(listing.price, 0);
    }

    #[test]
    fn stringy_price_parses_leniently() {
        let record = json!({
            "id": 8,
            "manufacturer": {"name": "Honda"},
            "model": {"name": "Accord"},
            "year": 2021,
            "buy_now": "$15,250"
        });
        let listing = transform(&record, YEAR).unwrap();
        assert_eq!(listing.price, 15250);
    }

    #[test]
    fn title_is_derived_when_missing() {
        let listing = transform(&valid_record(), YEAR).unwrap();
        assert_eq!(listing.title, "2022 Tesla Model 3");
    }

    #[test]
    fn sold_status_is_carried() {
        let mut record = valid_record();
        record["lots"][0]["status"] = json!({"name": "sold"});
        let listing = transform(&record, YEAR).unwrap();
        assert_eq!(listing.status, ListingStatus::Sold);
    }
}
