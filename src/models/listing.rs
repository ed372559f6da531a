//! Listing entity model
//!
//! SeaORM entity for the listings table, the local cache of the external
//! auction inventory. The feed-assigned external id is the primary key;
//! rows are soft-archived rather than deleted by the sync engine.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use std::fmt;

/// Listing entity representing one cached auction lot
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "listings")]
pub struct Model {
    /// Feed-assigned identifier, stable across sweeps (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: i64,

    /// Manufacturer name
    pub make: String,

    /// Model name
    pub model: String,

    /// Model year
    pub year: i32,

    /// Derived price in whole currency units (max of buy-now and current bid)
    pub price: i64,

    /// Odometer reading in miles
    pub mileage: i32,

    /// Display title, derived from year/make/model when the feed omits one
    pub title: String,

    /// Vehicle identification number
    pub vin: Option<String>,

    /// Exterior color
    pub color: Option<String>,

    /// Fuel type
    pub fuel: Option<String>,

    /// Transmission type
    pub transmission: Option<String>,

    /// Auction lot number
    pub lot_number: Option<String>,

    /// Primary image URL
    pub image_url: Option<String>,

    /// Full image URL list
    #[sea_orm(column_type = "JsonBinary")]
    pub images: Option<JsonValue>,

    /// Vehicle condition (excellent|good|fair|poor|salvage)
    pub condition: String,

    /// Whether the lot is in a live auction
    pub is_live: bool,

    /// Whether keys are available for the vehicle
    pub keys_available: bool,

    /// Listing status (active, sold, removed_after_sold, ...)
    pub status: String,

    /// Visibility master switch; false means never shown to catalog readers
    pub is_active: bool,

    /// Whether the listing has been archived by reconciliation
    pub is_archived: bool,

    /// Timestamp of archival, starts the 24h grace window
    pub archived_at: Option<DateTimeWithTimeZone>,

    /// Reason the listing was archived (e.g. "sold")
    pub archive_reason: Option<String>,

    /// Content hash over business fields, used to detect unchanged records
    pub content_hash: String,

    /// Timestamp of the last sweep that observed this listing
    pub last_synced_at: DateTimeWithTimeZone,

    /// Timestamp when the row was first created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Canonical registry of listing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Active,
    Sold,
    RemovedAfterSold,
    ImmediatelyRemovedAfterSold,
    AdminBulkDelete,
}

impl ListingStatus {
    /// Return the canonical string representation for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::RemovedAfterSold => "removed_after_sold",
            ListingStatus::ImmediatelyRemovedAfterSold => "immediately_removed_after_sold",
            ListingStatus::AdminBulkDelete => "admin_bulk_delete",
        }
    }

    /// Returns `true` for statuses that hide the listing permanently.
    pub const fn is_removed(self) -> bool {
        matches!(
            self,
            ListingStatus::RemovedAfterSold
                | ListingStatus::ImmediatelyRemovedAfterSold
                | ListingStatus::AdminBulkDelete
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses that make a listing invisible regardless of archival state.
pub const REMOVED_STATUSES: &[ListingStatus] = &[
    ListingStatus::RemovedAfterSold,
    ListingStatus::ImmediatelyRemovedAfterSold,
    ListingStatus::AdminBulkDelete,
];

/// Canonical registry of vehicle conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListingCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
    Salvage,
}

impl ListingCondition {
    /// Return the canonical string representation for this condition.
    pub const fn as_str(self) -> &'static str {
        match self {
            ListingCondition::Excellent => "excellent",
            ListingCondition::Good => "good",
            ListingCondition::Fair => "fair",
            ListingCondition::Poor => "poor",
            ListingCondition::Salvage => "salvage",
        }
    }

    /// Parse a feed condition string, falling back to `Good` for anything
    /// unrecognized.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "excellent" => ListingCondition::Excellent,
            "good" => ListingCondition::Good,
            "fair" | "average" => ListingCondition::Fair,
            "poor" | "rough" => ListingCondition::Poor,
            "salvage" | "junk" => ListingCondition::Salvage,
            _ => ListingCondition::Good,
        }
    }
}

impl fmt::Display for ListingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parse_falls_back_to_good() {
        assert_eq!(ListingCondition::parse("Excellent"), ListingCondition::Excellent);
        assert_eq!(ListingCondition::parse("junk"), ListingCondition::Salvage);
        assert_eq!(ListingCondition::parse("pristine"), ListingCondition::Good);
        assert_eq!(ListingCondition::parse(""), ListingCondition::Good);
    }

    #[test]
    fn removed_statuses_are_flagged() {
        assert!(ListingStatus::RemovedAfterSold.is_removed());
        assert!(ListingStatus::ImmediatelyRemovedAfterSold.is_removed());
        assert!(ListingStatus::AdminBulkDelete.is_removed());
        assert!(!ListingStatus::Active.is_removed());
        assert!(!ListingStatus::Sold.is_removed());
    }
}
