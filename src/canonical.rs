//! Canonical body construction.
//!
//! Form values (and flattened JSON) are matched against the schema paths and
//! written into a single JSON document. That document is what gets
//! deserialized into the destination and what gets validated, so both always
//! see the same content.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::trace;

use crate::coerce::coerce;
use crate::error::DecodeError;
use crate::form::FormValues;
use crate::types::{json_type_name, ParseErrorStrategy, SchemaPath};

/// Build the canonical JSON document from form values.
///
/// Each key is matched against the first schema path with the same name;
/// keys without a schema path are dropped.
///
/// # Errors
///
/// Returns `DecodeError::Conversion` under
/// `ParseErrorStrategy::ReturnOnConversionErrors`, and `DecodeError::SetValue`
/// if two paths collide (e.g. `a` set to a string, then `a.b`).
pub fn build_canonical(
    values: &FormValues,
    paths: &[SchemaPath],
    strategy: ParseErrorStrategy,
) -> Result<Value, DecodeError> {
    let mut lookup: HashMap<&str, &SchemaPath> = HashMap::with_capacity(paths.len());
    for path in paths {
        lookup.entry(path.name.as_str()).or_insert(path);
    }

    let mut document = Value::Object(Map::new());
    for (key, raw) in values {
        let Some(path) = lookup.get(key.as_str()) else {
            trace!(field = %key, "dropping field without schema path");
            continue;
        };

        if let Some(value) = coerce(key, raw, path.ty, strategy)? {
            set_path(&mut document, &path.name, value)?;
        }
    }

    Ok(document)
}

/// Set `value` at a dotted `path`, creating intermediate containers.
///
/// A decimal segment creates an array (padded with `null`) when the
/// container doesn't exist yet; `\.` escapes a literal dot.
///
/// ```
/// use schema_decoder::set_path;
/// use serde_json::json;
///
/// let mut doc = json!({});
/// set_path(&mut doc, "traits.emails.1", json!("b@example.com")).unwrap();
/// assert_eq!(doc, json!({ "traits": { "emails": [null, "b@example.com"] } }));
/// ```
///
/// # Errors
///
/// Returns `DecodeError::SetValue` if the path runs through a scalar, or
/// indexes an existing array with a non-numeric segment.
pub fn set_path(document: &mut Value, path: &str, value: Value) -> Result<(), DecodeError> {
    let segments = split_path(path);
    set_segments(document, &segments, value).map_err(|message| DecodeError::SetValue {
        path: path.to_string(),
        message,
    })
}

/// Split a dotted path into segments, honouring `\.` escapes.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

fn set_segments(target: &mut Value, segments: &[String], value: Value) -> Result<(), String> {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    if target.is_null() {
        *target = match parse_index(head) {
            Some(_) => Value::Array(Vec::new()),
            None => Value::Object(Map::new()),
        };
    }

    match target {
        Value::Object(map) => {
            let child = map.entry(head.clone()).or_insert(Value::Null);
            set_segments(child, rest, value)
        }
        Value::Array(items) => {
            let index = parse_index(head)
                .ok_or_else(|| format!("\"{}\" is not an array index", head))?;
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            set_segments(&mut items[index], rest, value)
        }
        other => Err(format!(
            "cannot set \"{}\" inside a {}",
            head,
            json_type_name(other)
        )),
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
