//! Canonical JSON serialization for deterministic hashing.
//!
//! Both the snapshot manifest and the metadata ledger are persisted in a
//! byte-deterministic JSON form: any two serializations of equal values are
//! byte-identical, so a SHA-256 over the output is a stable identity.
//!
//! Canonical JSON here means:
//! - Object keys sorted lexicographically (code-point order)
//! - No whitespace; separators are `,` and `:`
//! - Arrays in element order
//! - UTF-8 output, no BOM
//! - Numbers in serde_json's shortest round-trip form (ryu for floats),
//!   which pins float formatting across hosts
//!
//! Floats are permitted because the manifest's `created_at` field is a
//! fractional unix timestamp; the shortest-round-trip formatter guarantees
//! `parse → serialize` is the identity on canonical output.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize `value` into canonical JSON bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON (for example
/// a non-finite float).
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let mut out = Vec::<u8>::new();
    write_value(&v, &mut out)?;
    Ok(out)
}

/// Same as [`to_canonical_bytes`], but returns a UTF-8 String.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes)
        .map_err(|_| crate::error::SnapvaultError::internal("canonical output was not UTF-8"))
}

fn write_value(v: &Value, out: &mut Vec<u8>) -> Result<()> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            // serde_json formats integers exactly and floats via ryu
            // (shortest round-trip), which is the pinned contract.
            serde_json::to_writer(&mut *out, n)?;
        }
        Value::String(s) => {
            serde_json::to_writer(&mut *out, s)?;
        }
        Value::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<()> {
    out.push(b'{');

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, *k)?;
        out.push(b':');
        if let Some(val) = map.get(*k) {
            write_value(val, out)?;
        }
    }

    out.push(b'}');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_and_has_no_whitespace() {
        let v = json!({"snapshot_id":"snap_1_ab","created_at":1.5});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"created_at":1.5,"snapshot_id":"snap_1_ab"}"#);
    }

    #[test]
    fn sorts_nested_objects_recursively() {
        let v = json!({
            "b": { "d": 2, "c": 1 },
            "a": 0
        });
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"a":0,"b":{"c":1,"d":2}}"#);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!([3, 2, 1]);
        assert_eq!(to_canonical_string(&v).unwrap(), "[3,2,1]");
    }

    #[test]
    fn float_formatting_is_shortest_round_trip() {
        let v = json!({"t": 1723651200.125});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"t":1723651200.125}"#);

        // Reparse and re-serialize: byte-identical
        let reparsed: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(to_canonical_string(&reparsed).unwrap(), s);
    }

    #[test]
    fn string_escaping_is_stable() {
        let v = json!({"s": "a\"b\nc"});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"s":"a\"b\nc"}"#);
    }

    #[test]
    fn handles_empty_containers() {
        assert_eq!(to_canonical_string(&json!({})).unwrap(), "{}");
        assert_eq!(to_canonical_string(&json!([])).unwrap(), "[]");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::{BTreeMap, HashMap};

        proptest! {
            #[test]
            fn insertion_order_does_not_affect_canonical_output(
                pairs in prop::collection::vec(
                    ("[a-z]{1,8}", "[a-z0-9]{1,16}"),
                    1..10
                )
            ) {
                let hashmap: HashMap<String, String> = pairs.iter().cloned().collect();
                let btreemap: BTreeMap<String, String> = pairs.iter().cloned().collect();

                let from_hash = to_canonical_string(&hashmap).unwrap();
                let from_btree = to_canonical_string(&btreemap).unwrap();

                prop_assert_eq!(from_hash, from_btree);
            }

            #[test]
            fn canonicalize_is_idempotent_through_reparse(
                pairs in prop::collection::vec(
                    ("[a-z]{1,5}", -1000i64..1000i64),
                    1..6
                )
            ) {
                let map: BTreeMap<String, i64> = pairs.iter().cloned().collect();
                let once = to_canonical_string(&map).unwrap();
                let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
                let twice = to_canonical_string(&reparsed).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
