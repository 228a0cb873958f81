//! Structural comparison of desired and live objects
//!
//! The API server defaults and annotates fields we never set, so plain
//! equality would report drift on every pass. Instead a live object is up
//! to date when every field we set appears in it with the same value.

use serde_json::{Map, Value};

/// True when `desired` is contained in `live`.
///
/// Nulls in `desired` are "not set" and always match. An empty object or
/// array matches a missing field. Arrays must have the same length and
/// match element-wise.
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            match have.get(key) {
                Some(found) => is_subset(value, found),
                None => is_unset(value),
            }
        }),
        (Value::Object(want), Value::Null) => want.values().all(is_unset),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (Value::Array(want), Value::Null) => want.is_empty(),
        (want, have) => want == have,
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_unset),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Overlay `desired` onto `live`: objects merge key by key, everything else
/// (scalars and arrays) is replaced. Nulls in `desired` leave `live` alone.
pub fn merge(live: &mut Value, desired: &Value) {
    match (live, desired) {
        (_, Value::Null) => {}
        (Value::Object(have), Value::Object(want)) => {
            for (key, value) in want {
                match have.get_mut(key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        if !value.is_null() {
                            have.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// The fields the operator owns on a child: labels, owner references and
/// spec. Status and server-populated metadata are left out.
pub fn comparable(object: &Value) -> Value {
    let mut metadata = Map::new();
    if let Some(meta) = object.get("metadata") {
        for key in ["labels", "ownerReferences"] {
            if let Some(value) = meta.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }
    }

    let mut out = Map::new();
    out.insert("metadata".to_string(), Value::Object(metadata));
    if let Some(spec) = object.get("spec") {
        out.insert("spec".to_string(), spec.clone());
    }
    Value::Object(out)
}
