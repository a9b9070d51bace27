use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuilds `value` with every object's keys in sorted order. Arrays keep
/// their order: block sequence is part of the content.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// sha256 hex digest of the canonical JSON form of `spec`.
pub fn compute_spec_hash<T: Serialize + ?Sized>(spec: &T) -> Result<String> {
    let canonical = canonicalize(serde_json::to_value(spec)?);
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(&canonical)?.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fixtures::sample_lesson;
    use serde_json::json;

    #[test]
    fn same_spec_same_hash() {
        let a = compute_spec_hash(&sample_lesson("lesson-1")).unwrap();
        let b = compute_spec_hash(&sample_lesson("lesson-1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": [1, 2], "x": null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": null, "y": [1, 2]}, "b": 1}"#).unwrap();
        assert_eq!(
            compute_spec_hash(&a).unwrap(),
            compute_spec_hash(&b).unwrap()
        );
    }

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u32,
        alpha: &'static str,
        middle: Inner,
    }

    #[derive(Serialize)]
    struct Inner {
        y: Vec<u32>,
        x: bool,
    }

    #[test]
    fn hash_covers_keys_in_sorted_order_regardless_of_field_order() {
        let value = Unsorted {
            zeta: 1,
            alpha: "a",
            middle: Inner {
                y: vec![2, 1],
                x: true,
            },
        };
        let expected = format!(
            "{:x}",
            Sha256::digest(br#"{"alpha":"a","middle":{"x":true,"y":[2,1]},"zeta":1}"#)
        );
        assert_eq!(compute_spec_hash(&value).unwrap(), expected);
    }

    #[test]
    fn array_order_matters() {
        let a = json!({"blocks": ["one", "two"]});
        let b = json!({"blocks": ["two", "one"]});
        assert_ne!(
            compute_spec_hash(&a).unwrap(),
            compute_spec_hash(&b).unwrap()
        );
    }

    #[test]
    fn any_leaf_change_changes_the_hash() {
        let base = sample_lesson("lesson-1");
        let mut edited = base.clone();
        edited.title.push('!');
        assert_ne!(
            compute_spec_hash(&base).unwrap(),
            compute_spec_hash(&edited).unwrap()
        );

        let mut nested = base.clone();
        nested.estimated_duration += 1;
        assert_ne!(
            compute_spec_hash(&base).unwrap(),
            compute_spec_hash(&nested).unwrap()
        );
    }
}
