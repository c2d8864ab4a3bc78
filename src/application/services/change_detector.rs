use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::value_objects::ContentHash;
use crate::shared::error::Result;

/// Canonical serialization: object keys sorted recursively, null and absent
/// members collapse to the same form, array order preserved. Two payloads
/// with the same key/value pairs hash identically regardless of insertion
/// order, which the rest of the engine reads as "no remote write needed".
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

pub fn content_hash(value: &Value) -> Result<ContentHash> {
    let canonical = canonical_json(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(ContentHash::from_hex(hex::encode(digest)))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push_str(&serde_json::to_string(value)?);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_digest() {
        let a = json!({"name": "X", "email": "x@example.test", "teams": ["a", "b"]});
        let b = json!({"teams": ["a", "b"], "email": "x@example.test", "name": "X"});
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn array_order_changes_digest() {
        let a = json!({"teams": ["a", "b"]});
        let b = json!({"teams": ["b", "a"]});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn null_and_absent_fields_hash_identically() {
        let explicit = json!({"name": "X", "phone": null});
        let absent = json!({"name": "X"});
        assert_eq!(
            content_hash(&explicit).unwrap(),
            content_hash(&absent).unwrap()
        );
    }

    #[test]
    fn nested_objects_are_canonicalized_recursively() {
        let a = json!({"address": {"city": "Utrecht", "street": "Laan 1"}, "name": "X"});
        let b = json!({"name": "X", "address": {"street": "Laan 1", "city": "Utrecht"}});
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn value_changes_change_digest() {
        let a = json!({"name": "X"});
        let b = json!({"name": "Y"});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn canonical_form_is_stable() {
        let value = json!({"b": 1, "a": [1, 2, {"z": null, "y": "s"}]});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":[1,2,{"y":"s"}],"b":1}"#
        );
    }
}
