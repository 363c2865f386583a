//! Schema loading from various sources.
//!
//! Handles loading schema documents from files, strings, raw bytes and HTTP URLs.

use std::path::Path;

use serde_json::Value;

use crate::error::CompileError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a schema from a file path.
///
/// # Errors
///
/// Returns `CompileError::FileNotFound` if the file doesn't exist,
/// or `CompileError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, CompileError> {
    if !path.exists() {
        return Err(CompileError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read(path).map_err(|source| CompileError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_schema_bytes(&content)
}

/// Load a schema from raw JSON bytes.
pub fn load_schema_bytes(content: &[u8]) -> Result<Value, CompileError> {
    serde_json::from_slice(content).map_err(|source| CompileError::InvalidJson { source })
}

/// Load a schema from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `CompileError::NetworkError` if the request fails,
/// or `CompileError::InvalidJson` if the response isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str) -> Result<Value, CompileError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| CompileError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|source| CompileError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let content = response
        .bytes()
        .map_err(|source| CompileError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    load_schema_bytes(&content)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Split a schema reference into its document id and optional `#` fragment.
///
/// `"user.json#/$defs/name"` becomes `("user.json", Some("#/$defs/name"))`.
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.find('#') {
        Some(idx) => (&reference[..idx], Some(&reference[idx..])),
        None => (reference, None),
    }
}

/// Navigate a JSON Pointer fragment (e.g., "#/$defs/foo" or "#/properties/bar").
///
/// Returns the value at the given JSON Pointer path within the schema.
/// The fragment should start with '#' (e.g., "#/$defs/foo").
pub fn navigate_fragment<'a>(schema: &'a Value, fragment: &str) -> Result<&'a Value, CompileError> {
    // Remove leading # and split by /
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(schema);
    }

    let mut current = schema;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            other => other.get(&key),
        };
        current = next.ok_or_else(|| CompileError::BundleError {
            reference: fragment.to_string(),
            message: "fragment not found".to_string(),
        })?;
    }
    Ok(current)
}

/// Load a schema from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_schema_auto(source: &str) -> Result<Value, CompileError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(CompileError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_schema(Path::new(source))
    }
}
