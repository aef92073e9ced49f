//! Canonical JSON encoding.
//!
//! Anything that gets hashed (state ids) or compared byte-for-byte must
//! serialize its keys in a stable order. `serde_json::Value::Object` is
//! backed by a `BTreeMap` when the `preserve_order` feature is off, so
//! building values through [`canonical_object`] and encoding with
//! [`to_canonical_bytes`] is sufficient without hand-rolling a sorter.

use serde_json::{Map, Value};

/// Builds a JSON object from `(key, value)` pairs with keys in sorted order.
#[must_use]
pub fn canonical_object(pairs: Vec<(&str, Value)>) -> Value {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_owned(), v);
    }
    Value::Object(map)
}

/// Encodes a value to its canonical UTF-8 JSON byte form.
///
/// # Panics
/// Panics only if `value` contains a non-finite float, which cannot occur
/// for the domain types this crate serializes (timestamps, hashes, counts).
#[must_use]
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("domain values are always representable as JSON")
}

/// Builds the payload hashed to derive a state id:
/// `{created_at, nonce, parent_id, root_tree}` with keys in sorted order.
#[must_use]
pub fn state_payload(root_tree: &str, parent_id: Option<&str>, created_at: f64, nonce: &str) -> Vec<u8> {
    let value = canonical_object(vec![
        ("created_at", Value::from(created_at)),
        ("nonce", Value::String(nonce.to_owned())),
        ("parent_id", parent_id.map_or(Value::Null, |p| Value::String(p.to_owned()))),
        ("root_tree", Value::String(root_tree.to_owned())),
    ]);
    to_canonical_bytes(&value)
}
