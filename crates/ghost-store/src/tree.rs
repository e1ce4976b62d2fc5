//! Plain functions over the JSON tree held by [`crate::MemoryStore`].

use serde_json::Map;

use crate::path::StorePath;
use crate::Value;

/// Null and `{}` both mean "nothing here".
pub(crate) fn is_vacant(v: &Value) -> bool {
    v.is_null() || v.as_object().is_some_and(Map::is_empty)
}

pub(crate) fn get_at<'a>(tree: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = tree;
    for seg in path.segments() {
        node = node.as_object()?.get(seg)?;
    }
    if is_vacant(node) { None } else { Some(node) }
}

/// Write (or with `None`, remove) the value at `path`, pruning parents that
/// become empty.
pub(crate) fn write_at(tree: &mut Value, path: &StorePath, value: Option<Value>) {
    let value = value.map(normalize).filter(|v| !is_vacant(v));
    match path.segments() {
        [] => *tree = value.unwrap_or_else(|| Value::Object(Map::new())),
        segs => write_rec(tree, segs, value),
    }
}

fn write_rec(node: &mut Value, segs: &[String], value: Option<Value>) {
    let Some((head, rest)) = segs.split_first() else {
        return;
    };
    if !node.is_object() {
        if value.is_none() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        match value {
            Some(v) => {
                map.insert(head.clone(), v);
            }
            None => {
                map.remove(head);
            }
        }
        return;
    }

    match map.get_mut(head) {
        Some(child) => write_rec(child, rest, value),
        None if value.is_some() => {
            let mut child = Value::Object(Map::new());
            write_rec(&mut child, rest, value);
            map.insert(head.clone(), child);
        }
        None => {}
    }
    if map.get(head).is_some_and(is_vacant) {
        map.remove(head);
    }
}

/// Drop null members and empty objects, recursively.
pub(crate) fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_vacant(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// Replace every server-timestamp placeholder with `now_ms`.
pub(crate) fn resolve_server_values(value: Value, now_ms: i64) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp") {
                return Value::from(now_ms);
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, resolve_server_values(v, now_ms)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| resolve_server_values(v, now_ms))
                .collect(),
        ),
        other => other,
    }
}
