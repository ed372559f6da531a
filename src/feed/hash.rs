//! Content hashing for change detection.
//!
//! The hash covers every business field of a canonical listing and excludes
//! volatile bookkeeping (`last_synced_at`, row timestamps). It is an
//! optimization signal only: upserts stay correct even if a stored hash is
//! stale, the hash merely lets future sweeps skip redundant writes.

use std::collections::BTreeMap;

use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};

use crate::feed::transform::CanonicalListing;

/// Compute the deterministic content hash for a canonical listing.
///
/// Fields are serialized through a BTreeMap, so equal business content
/// hashes equally regardless of field insertion order.
pub fn content_hash(listing: &CanonicalListing) -> String {
    let mut fields: BTreeMap<&'static str, JsonValue> = BTreeMap::new();
    fields.insert("external_id", json!(listing.external_id));
    fields.insert("make", json!(listing.make));
    fields.insert("model", json!(listing.model));
    fields.insert("year", json!(listing.year));
    fields.insert("price", json!(listing.price));
    fields.insert("mileage", json!(listing.mileage));
    fields.insert("title", json!(listing.title));
    fields.insert("vin", json!(listing.vin));
    fields.insert("color", json!(listing.color));
    fields.insert("fuel", json!(listing.fuel));
    fields.insert("transmission", json!(listing.transmission));
    fields.insert("lot_number", json!(listing.lot_number));
    fields.insert("image_url", json!(listing.image_url));
    fields.insert("images", json!(listing.images));
    fields.insert("condition", json!(listing.condition.as_str()));
    fields.insert("is_live", json!(listing.is_live));
    fields.insert("keys_available", json!(listing.keys_available));
    fields.insert("status", json!(listing.status.as_str()));

    let serialized = serde_json::to_vec(&fields).expect("listing fields serialize");
    let digest = Sha256::digest(&serialized);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::transform::transform;
    use serde_json::json;

    fn listing() -> CanonicalListing {
        let record = json!({
            "id": 42001,
            "manufacturer": {"name": "Tesla"},
            "model": {"name": "Model 3"},
            "year": 2022,
            "lots": [{"buy_now": 20000}]
        });
        transform(&record, 2026).unwrap()
    }

    #[test]
    fn equal_content_hashes_equally() {
        assert_eq!(content_hash(&listing()), content_hash(&listing()));
    }

    #[test]
    fn business_field_change_changes_hash() {
        let base = listing();
        let mut changed = base.clone();
        changed.price = 21000;
        assert_ne!(content_hash(&base), content_hash(&changed));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = content_hash(&listing());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
