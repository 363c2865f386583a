//! Core types for schema-driven body decoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media type of multipart form bodies.
pub const CONTENT_TYPE_MULTIPART_FORM: &str = "multipart/form-data";

/// Media type of URL-encoded form bodies.
pub const CONTENT_TYPE_URL_ENCODED_FORM: &str = "application/x-www-form-urlencoded";

/// Media type of JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// HTTP methods accepted when no explicit list is configured.
pub const DEFAULT_ALLOWED_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

/// Default bound on how often a circular `$ref` is expanded.
pub const DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH: u8 = 5;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// What to do when a raw form value cannot be converted to its declared type.
///
/// Given `{"ratio": {"type": "number"}}` and `ratio=foobar`:
///
/// | Strategy | Canonical body |
/// |----------|----------------|
/// | `IgnoreConversionErrors` | `{"ratio":"foobar"}` |
/// | `UseEmptyValueOnConversionErrors` | `{"ratio":0}` |
/// | `ReturnOnConversionErrors` | decode fails with a [`ConversionError`](crate::ConversionError) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorStrategy {
    /// Keep the raw string value.
    #[default]
    IgnoreConversionErrors,
    /// Use the zero value of the declared type (`0`, `false`).
    UseEmptyValueOnConversionErrors,
    /// Abort the whole decode.
    ReturnOnConversionErrors,
}

impl ParseErrorStrategy {
    /// Parse a strategy from its short name (`ignore`, `empty`, `return`).
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ignore" => Some(ParseErrorStrategy::IgnoreConversionErrors),
            "empty" => Some(ParseErrorStrategy::UseEmptyValueOnConversionErrors),
            "return" => Some(ParseErrorStrategy::ReturnOnConversionErrors),
            _ => None,
        }
    }
}

/// Declared type of a schema path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "array<string>")]
    ArrayOfString,
    #[serde(rename = "array<number>")]
    ArrayOfNumber,
    #[serde(rename = "array<boolean>")]
    ArrayOfBoolean,
    #[serde(rename = "array<object>")]
    ArrayOfObject,
    #[serde(rename = "array<any>")]
    ArrayOfAny,
}

impl PathType {
    /// Returns the display name, e.g. `array<number>`.
    pub fn name(&self) -> &'static str {
        match self {
            PathType::String => "string",
            PathType::Number => "number",
            PathType::Boolean => "boolean",
            PathType::Object => "object",
            PathType::ArrayOfString => "array<string>",
            PathType::ArrayOfNumber => "array<number>",
            PathType::ArrayOfBoolean => "array<boolean>",
            PathType::ArrayOfObject => "array<object>",
            PathType::ArrayOfAny => "array<any>",
        }
    }

    /// True for the `array<...>` variants.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            PathType::ArrayOfString
                | PathType::ArrayOfNumber
                | PathType::ArrayOfBoolean
                | PathType::ArrayOfObject
                | PathType::ArrayOfAny
        )
    }

    /// Map a JSON Schema `type` keyword value to a scalar path type.
    ///
    /// `integer` is folded into `number`. Returns `None` for `array`,
    /// `null` and unknown names.
    pub fn from_scalar_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PathType::String),
            "number" | "integer" => Some(PathType::Number),
            "boolean" => Some(PathType::Boolean),
            "object" => Some(PathType::Object),
            _ => None,
        }
    }

    /// The array variant whose elements have this type.
    pub fn array_of(item: Option<PathType>) -> Self {
        match item {
            Some(PathType::String) => PathType::ArrayOfString,
            Some(PathType::Number) => PathType::ArrayOfNumber,
            Some(PathType::Boolean) => PathType::ArrayOfBoolean,
            Some(PathType::Object) => PathType::ArrayOfObject,
            _ => PathType::ArrayOfAny,
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dotted field locator plus its declared type, derived from a JSON Schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPath {
    /// Dotted name, e.g. `traits.address.city`.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: PathType,
}

impl SchemaPath {
    pub fn new(name: impl Into<String>, ty: PathType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
