//! Nested document get/set helpers (DESIGN NOTES §9: "Nested field
//! set/get"). Cleaning, validation, and LLM-result merging all walk
//! nested JSON documents through dotted field paths, with array
//! broadcast: a path segment encountered while positioned on a JSON
//! array applies to every element.

use serde_json::{Map, Value};

/// Get the value(s) at `path` in `doc`. Returns a single value normally;
/// when the path crosses an array, returns the array of per-element
/// results (broadcast), which callers that expect scalars should treat
/// as "apply to each element".
#[must_use]
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Get all leaf values reachable from `path`, broadcasting through any
/// arrays encountered along the way. Used by validation/cleaning so a
/// path like `order.line.qty` yields one value per line-item.
#[must_use]
pub fn get_broadcast<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut frontier: Vec<&Value> = vec![doc];
    for segment in segments {
        let mut next = Vec::new();
        for node in frontier {
            match node {
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.as_object().and_then(|o| o.get(segment)) {
                            next.push(child);
                        }
                    }
                }
                Value::Object(obj) => {
                    if let Some(child) = obj.get(segment) {
                        next.push(child);
                    }
                }
                _ => {}
            }
        }
        frontier = next;
    }
    frontier
}

/// Set `value` at `path` in `doc`, creating intermediate objects as
/// needed. When both the existing value and `value` are objects, they
/// are deep-merged (existing keys kept unless overwritten by `value`);
/// otherwise `value` replaces the prior contents outright.
pub fn set(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_inner(doc, &segments, value);
}

fn set_inner(doc: &mut Value, segments: &[&str], value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let obj = doc.as_object_mut().expect("just ensured object");
    let (head, rest) = segments.split_first().expect("non-empty path");
    if rest.is_empty() {
        match (obj.get(*head), &value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let mut merged = existing.clone();
                deep_merge(&mut merged, incoming);
                obj.insert((*head).to_string(), Value::Object(merged));
            }
            _ => {
                obj.insert((*head).to_string(), value);
            }
        }
    } else {
        let entry = obj
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_inner(entry, rest, value);
    }
}

fn deep_merge(base: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        match (base.get_mut(key), value) {
            (Some(Value::Object(base_obj)), Value::Object(incoming_obj)) => {
                deep_merge(base_obj, incoming_obj);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_simple_path() {
        let doc = json!({"amount": "123"});
        assert_eq!(get(&doc, "amount"), Some(&json!("123")));
    }

    #[test]
    fn get_nested_path() {
        let doc = json!({"order": {"id": "INV-1"}});
        assert_eq!(get(&doc, "order.id"), Some(&json!("INV-1")));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        set(&mut doc, "order.id", json!("INV-1"));
        assert_eq!(doc, json!({"order": {"id": "INV-1"}}));
    }

    #[test]
    fn set_deep_merges_objects() {
        let mut doc = json!({"order": {"id": "INV-1", "total": 10}});
        set(&mut doc, "order", json!({"total": 20}));
        assert_eq!(doc, json!({"order": {"id": "INV-1", "total": 20}}));
    }

    #[test]
    fn get_broadcast_through_array() {
        let doc = json!({"order": {"line": [{"qty": 1}, {"qty": 2}, {"qty": 3}]}});
        let values = get_broadcast(&doc, "order.line.qty");
        assert_eq!(values, vec![&json!(1), &json!(2), &json!(3)]);
    }
}
