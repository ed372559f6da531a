//! Prioritized-fallback field extraction over raw feed payloads.
//!
//! Feed records are deeply nested and duck-typed: the same logical field is
//! reachable through several alternate paths depending on the feed variant.
//! Each canonical field declares its lookup paths once, in priority order,
//! instead of scattering optional-chaining through the transformer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("static regex"));

/// Resolve a dot-separated path against a JSON tree. Numeric segments index
/// into arrays ("lots.0.bid" reads `lots[0].bid`).
pub fn value_at<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// Return the first non-null value among the given paths.
pub fn first_value<'a>(root: &'a JsonValue, paths: &[&str]) -> Option<&'a JsonValue> {
    paths.iter().find_map(|path| value_at(root, path))
}

/// Extract a non-empty trimmed string from the first matching path.
pub fn string_at(root: &JsonValue, paths: &[&str]) -> Option<String> {
    first_value(root, paths).and_then(|value| match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Extract a number from the first matching path. String values go through
/// the lenient parser; anything unparsable yields `None`.
pub fn number_at(root: &JsonValue, paths: &[&str]) -> Option<f64> {
    first_value(root, paths).and_then(|value| match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => lenient_number(s),
        _ => None,
    })
}

/// Extract a boolean from the first matching path, accepting the usual
/// stringy spellings feeds use ("yes"/"no", "true"/"false", 0/1).
pub fn bool_at(root: &JsonValue, paths: &[&str]) -> Option<bool> {
    first_value(root, paths).and_then(|value| match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_i64().map(|n| n != 0),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Extract a list of strings from the first matching path holding an array.
pub fn string_list_at(root: &JsonValue, paths: &[&str]) -> Vec<String> {
    first_value(root, paths)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Lenient numeric coercion: strip everything that is not a digit, dot or
/// sign, then parse. Returns `None` when nothing numeric remains; the
/// transformer maps that to its 0 fallback. The fallback is a coercion
/// artifact, not a valid zero — downstream consumers filter non-positive
/// prices before treating a record as priced.
pub fn lenient_number(raw: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(raw, "");
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_at_walks_objects_and_arrays() {
        let record = json!({
            "lots": [{"bid": 1500, "images": {"normal": ["a.jpg", "b.jpg"]}}]
        });

        assert_eq!(value_at(&record, "lots.0.bid"), Some(&json!(1500)));
        assert_eq!(
            value_at(&record, "lots.0.images.normal.1"),
            Some(&json!("b.jpg"))
        );
        assert_eq!(value_at(&record, "lots.1.bid"), None);
        assert_eq!(value_at(&record, "missing.path"), None);
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let record = json!({"vin": null, "model": {"name": null}});
        assert_eq!(value_at(&record, "vin"), None);
        assert_eq!(string_at(&record, &["model.name", "model"]), None);
    }

    #[test]
    fn first_value_respects_priority_order() {
        let record = json!({"buy_now": null, "final_bid": 12000, "price": 9000});
        assert_eq!(
            first_value(&record, &["buy_now", "final_bid", "price"]),
            Some(&json!(12000))
        );
    }

    #[test]
    fn number_at_parses_stringy_numbers() {
        let record = json!({"odometer": "42,500 mi"});
        assert_eq!(number_at(&record, &["odometer"]), Some(42500.0));
    }

    #[test]
    fn lenient_number_strips_junk() {
        assert_eq!(lenient_number("$20,000"), Some(20000.0));
        assert_eq!(lenient_number("12 500 km"), Some(12500.0));
        assert_eq!(lenient_number("-3"), Some(-3.0));
        assert_eq!(lenient_number("n/a"), None);
        assert_eq!(lenient_number(""), None);
    }

    #[test]
    fn bool_at_accepts_stringy_spellings() {
        let record = json!({"keys": "YES", "live": 0, "flag": true});
        assert_eq!(bool_at(&record, &["keys"]), Some(true));
        assert_eq!(bool_at(&record, &["live"]), Some(false));
        assert_eq!(bool_at(&record, &["flag"]), Some(true));
        assert_eq!(bool_at(&record, &["absent"]), None);
    }

    #[test]
    fn string_list_at_collects_string_items() {
        let record = json!({"lots": [{"images": {"normal": ["a.jpg", 42, "b.jpg"]}}]});
        assert_eq!(
            string_list_at(&record, &["lots.0.images.normal"]),
            vec!["a.jpg".to_string(), "b.jpg".to_string()]
        );
        assert!(string_list_at(&record, &["lots.0.images.big"]).is_empty());
    }
}
