//! Dot-path access into nested JSON structure.
//!
//! Names with dots address nested mappings: `user.profile.name` walks two
//! object levels below the `user` entry. Reads through unset, null, or
//! non-mapping values yield `None`; writes auto-create intermediate
//! mappings, replacing any non-mapping value that stands in the way.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

/// Split a dot-path into segments. Returns `None` for an empty path or a
/// path with empty segments (`"a..b"`, `".a"`).
#[must_use]
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Whether `path` is a plain identifier path: `ident(.ident)*` with
/// identifiers of the form `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_identifier_path(path: &str) -> bool {
    match split_path(path) {
        Some(segments) => segments.iter().all(|s| is_identifier(s)),
        None => false,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Read `segments` out of a string-keyed map. The first segment indexes the
/// map; the rest walk nested objects.
#[must_use]
pub fn get_path<'a>(root: &'a FxHashMap<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = root.get(*first)?;
    for segment in rest {
        match current {
            Value::Object(map) => current = map.get(*segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Write `value` at `segments` in a string-keyed map, creating intermediate
/// objects as needed. A non-object intermediate is replaced by an object.
pub fn set_path(root: &mut FxHashMap<String, Value>, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        root.insert((*first).to_string(), value);
        return;
    }
    let slot = root
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    set_in_value(slot, rest, value);
}

fn set_in_value(target: &mut Value, segments: &[&str], value: Value) {
    let (first, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => return,
    };
    let map = match target {
        Value::Object(map) => map,
        _ => unreachable!("caller guarantees an object"),
    };
    if rest.is_empty() {
        map.insert((*first).to_string(), value);
        return;
    }
    let slot = map
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    set_in_value(slot, rest, value);
}
