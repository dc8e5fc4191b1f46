//! Query string folding.
//!
//! Flat `key=value` pairs become [`ParamValue`]s, with bracket keys
//! nesting the way web clients expect:
//!
//! ```text
//! s=...                  → s: Single
//! ids[]=1&ids[]=2        → ids: List [1, 2]
//! filter[status]=open    → filter: Map { status: Single }
//! filter[tag][]=a        → filter: Map { tag: List [a] }
//! ```
//!
//! A repeated plain key keeps its last value.

use std::collections::BTreeMap;
use sync_types::ParamValue;

/// Fold decoded query pairs into nested parameters.
pub fn fold_params(pairs: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    for (key, value) in pairs {
        let Some((base, path)) = split_key(&key) else {
            tracing::debug!(key = %key, "ignoring malformed query key");
            continue;
        };
        insert(&mut params, base, &path, value);
    }
    params
}

/// Whether the client opted in to additional data.
pub fn wants_additional_data(params: &BTreeMap<String, ParamValue>) -> bool {
    params
        .get("additional_data")
        .and_then(ParamValue::as_str)
        .is_some_and(|v| matches!(v.trim(), "true" | "1"))
}

/// `a[b][]` → `("a", ["b", ""])`.
fn split_key(key: &str) -> Option<(String, Vec<String>)> {
    let (base, mut rest) = match key.find('[') {
        Some(idx) => (&key[..idx], &key[idx..]),
        None => (key, ""),
    };
    if base.is_empty() {
        return None;
    }

    let mut path = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let end = inner.find(']')?;
        path.push(inner[..end].to_string());
        rest = &inner[end + 1..];
    }
    Some((base.to_string(), path))
}

fn insert(params: &mut BTreeMap<String, ParamValue>, key: String, path: &[String], value: String) {
    match path.split_first() {
        None => {
            params.insert(key, ParamValue::Single(value));
        }
        Some((segment, rest)) if segment.is_empty() && rest.is_empty() => {
            match params.get_mut(&key) {
                Some(ParamValue::List(values)) => values.push(value),
                _ => {
                    params.insert(key, ParamValue::List(vec![value]));
                }
            }
        }
        Some((segment, rest)) => {
            let entry = params
                .entry(key)
                .or_insert_with(|| ParamValue::Map(BTreeMap::new()));
            if !matches!(entry, ParamValue::Map(_)) {
                *entry = ParamValue::Map(BTreeMap::new());
            }
            if let ParamValue::Map(nested) = entry {
                insert(nested, segment.clone(), rest, value);
            }
        }
    }
}
