//! Form bodies: content-type matching, parsing and JSON flattening.

use std::collections::BTreeMap;

use http::header::CONTENT_TYPE;
use http::HeaderMap;
use percent_encoding::percent_decode;
use serde_json::Value;

use crate::error::FormError;

/// Multi-valued form fields, keyed by field name.
pub type FormValues = BTreeMap<String, Vec<String>>;

/// Media type assumed when a request has no `Content-Type` header.
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// The raw `Content-Type` header, or an empty string.
pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Lowercase media types listed in a `Content-Type` header value.
///
/// `"application/json; charset=utf-8"` yields `["application/json"]`.
pub fn media_types(content_type: &str) -> Vec<String> {
    if content_type.trim().is_empty() {
        return vec![DEFAULT_MEDIA_TYPE.to_string()];
    }
    content_type
        .split(',')
        .filter_map(|entry| {
            let media_type = entry.split(';').next().unwrap_or("").trim();
            (!media_type.is_empty()).then(|| media_type.to_ascii_lowercase())
        })
        .collect()
}

/// Returns true if the request's content type is one of `allowed`.
pub fn has_content_type<S: AsRef<str>>(headers: &HeaderMap, allowed: &[S]) -> bool {
    media_types(content_type(headers))
        .iter()
        .any(|t| allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(t)))
}

/// Value of the `name` parameter in a `Content-Type` header, unquoted.
pub fn content_type_param(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    })
}

/// Parse an `application/x-www-form-urlencoded` body.
///
/// # Errors
///
/// Returns `FormError::InvalidEscape` for a `%` not followed by two hex
/// digits and `FormError::InvalidUtf8` if a decoded pair isn't UTF-8.
pub fn parse_urlencoded(body: &[u8]) -> Result<FormValues, FormError> {
    for pair in body.split(|&b| b == b'&') {
        check_escapes(pair)?;
        if percent_decode(pair).decode_utf8().is_err() {
            let key = pair.split(|&b| b == b'=').next().unwrap_or_default();
            return Err(FormError::InvalidUtf8 {
                name: percent_decode(key).decode_utf8_lossy().replace('+', " "),
            });
        }
    }

    let mut values = FormValues::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        values
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    Ok(values)
}

fn check_escapes(pair: &[u8]) -> Result<(), FormError> {
    let mut rest = pair;
    while let Some(pos) = rest.iter().position(|&b| b == b'%') {
        let escape = &rest[pos..rest.len().min(pos + 3)];
        if escape.len() < 3 || !escape[1..].iter().all(u8::is_ascii_hexdigit) {
            return Err(FormError::InvalidEscape {
                escape: String::from_utf8_lossy(escape).into_owned(),
            });
        }
        rest = &rest[pos + 3..];
    }
    Ok(())
}

/// Parse the text fields of a `multipart/form-data` body.
///
/// Parts with a `filename` are file uploads and are skipped.
///
/// # Errors
///
/// Returns a `FormError` if the body isn't well-formed multipart.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormValues, FormError> {
    let delimiter = format!("--{}", boundary);
    let separator = format!("\r\n--{}", boundary);

    let start = find(body, delimiter.as_bytes(), 0).ok_or_else(|| {
        FormError::MissingOpeningBoundary {
            boundary: boundary.to_string(),
        }
    })?;
    let mut pos = start + delimiter.len();
    let mut values = FormValues::new();

    for index in 0.. {
        if body[pos..].starts_with(b"--") {
            return Ok(values);
        }
        pos += line_break_len(&body[pos..]);

        let end = find(body, separator.as_bytes(), pos).ok_or(FormError::UnterminatedBody)?;
        if let Some((name, value)) = parse_part(&body[pos..end], index)? {
            values.entry(name).or_default().push(value);
        }
        pos = end + separator.len();
    }

    Ok(values)
}

/// Flatten a JSON object into form values, one key per member.
///
/// Strings contribute their text, other scalars their JSON text, arrays one
/// value per element; `null`s are skipped and objects become compact JSON.
/// Returns `None` if `value` isn't an object.
pub fn flatten_json_object(value: &Value) -> Option<FormValues> {
    let object = value.as_object()?;
    let mut values = FormValues::new();
    for (key, member) in object {
        let raw: Vec<String> = match member {
            Value::Null => continue,
            Value::Array(items) => items.iter().filter_map(json_text).collect(),
            other => json_text(other).into_iter().collect(),
        };
        values.insert(key.clone(), raw);
    }
    Some(values)
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Returns `(name, value)` for text fields, `None` for file uploads.
fn parse_part(part: &[u8], index: usize) -> Result<Option<(String, String)>, FormError> {
    let header_end = find(part, b"\r\n\r\n", 0).ok_or(FormError::MalformedPart { index })?;
    let headers = String::from_utf8_lossy(&part[..header_end]);
    let content = &part[header_end + 4..];

    let disposition = headers
        .split("\r\n")
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-disposition")
                .then(|| value.trim().to_string())
        })
        .ok_or(FormError::MissingFieldName { index })?;

    if content_type_param(&disposition, "filename").is_some() {
        return Ok(None);
    }

    let name = content_type_param(&disposition, "name")
        .filter(|n| !n.is_empty())
        .ok_or(FormError::MissingFieldName { index })?;
    let value = String::from_utf8(content.to_vec())
        .map_err(|_| FormError::InvalidUtf8 { name: name.clone() })?;

    Ok(Some((name, value)))
}

fn line_break_len(rest: &[u8]) -> usize {
    if rest.starts_with(b"\r\n") {
        2
    } else if rest.starts_with(b"\n") {
        1
    } else {
        0
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
