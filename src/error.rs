//! Error types for schema loading, form parsing and body decoding.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Whether a failure is the client's fault or the deployment's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or invalid input (HTTP 400).
    BadRequest,
    /// Misconfiguration or environment failure (HTTP 500).
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors while loading, registering or compiling JSON Schemas.
#[derive(Debug, Error)]
pub enum CompileError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Schema errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("no JSON Schema registered for reference \"{reference}\"")]
    UnknownReference { reference: String },

    #[error("unable to resolve $ref \"{reference}\": {message}")]
    BundleError { reference: String, message: String },

    #[error("invalid schema {reference}: {message}")]
    InvalidSchema { reference: String, message: String },
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::FileNotFound { .. } | CompileError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            CompileError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A raw form value that could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected value of \"{name}\" to be a {expected} but got \"{value}\": {parse_error}")]
pub struct ConversionError {
    /// Form key of the offending field.
    pub name: String,
    /// Position within the value list, for array fields.
    pub index: Option<usize>,
    /// The raw value as received.
    pub value: String,
    /// Declared scalar type (`number` or `boolean`).
    pub expected: &'static str,
    /// Message of the underlying parser.
    pub parse_error: String,
}

impl ConversionError {
    /// Structured detail fields (`parse_error`, `name`, `index`, `value`).
    pub fn details(&self) -> BTreeMap<&'static str, String> {
        let mut details = BTreeMap::new();
        details.insert("parse_error", self.parse_error.clone());
        details.insert("name", self.name.clone());
        if let Some(index) = self.index {
            details.insert("index", index.to_string());
        }
        details.insert("value", self.value.clone());
        details
    }
}

/// Syntax errors in form-encoded bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("no multipart boundary param in Content-Type")]
    MissingBoundary,

    #[error("multipart body does not start with boundary \"{boundary}\"")]
    MissingOpeningBoundary { boundary: String },

    #[error("multipart body ended before the closing boundary")]
    UnterminatedBody,

    #[error("multipart part {index} has no header terminator")]
    MalformedPart { index: usize },

    #[error("multipart part {index} has no form-data name")]
    MissingFieldName { index: usize },

    #[error("invalid percent-escape \"{escape}\" in form body")]
    InvalidEscape { escape: String },

    #[error("value of form field \"{name}\" is not valid UTF-8")]
    InvalidUtf8 { name: String },
}

/// Single schema violation with path context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors while decoding a request body.
#[derive(Debug, Error)]
pub enum DecodeError {
    // Envelope rejections
    #[error(
        "unable to decode body because HTTP request method was \"{method}\" but only {} are supported",
        allowed.join(", ")
    )]
    MethodNotAllowed { method: String, allowed: Vec<String> },

    #[error("unable to decode HTTP request body because its \"Content-Length\" is zero")]
    EmptyBody,

    #[error(
        "HTTP {method} request used unknown \"Content-Type: {content_type}\", only {} are supported",
        allowed.join(", ")
    )]
    UnsupportedContentType {
        method: String,
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("unable to determine decoder for content type: {content_type}")]
    UnknownDecoder { content_type: String },

    // Body errors
    #[error("unable to read HTTP request body: {source}")]
    ReadBody {
        #[source]
        source: io::Error,
    },

    #[error("unable to decode HTTP {method} form body: {source}")]
    MalformedForm {
        method: String,
        #[source]
        source: FormError,
    },

    #[error("expected JSON sent in request body to be an object but got: {actual}")]
    NotAnObject { actual: &'static str },

    #[error("unable to decode JSON payload: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("unable to set value at \"{path}\": {message}")]
    SetValue { path: String, message: String },

    // Configuration errors
    #[error("unable to decode HTTP form body because no validation schema was provided")]
    MissingSchema,

    #[error("JSON Schema validation is required but no compiler was provided")]
    MissingCompiler,

    #[error("unable to load JSON Schema from location {reference}: {source}")]
    SchemaLoad {
        reference: String,
        #[source]
        source: CompileError,
    },

    #[error("unable to prepare JSON Schema {reference} for form parsing: {source}")]
    SchemaPaths {
        reference: String,
        #[source]
        source: CompileError,
    },

    // Validation
    #[error("payload failed JSON Schema validation with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaViolation> },
}

impl DecodeError {
    /// Whether the client or the deployment is at fault.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnknownDecoder { .. }
            | DecodeError::MissingSchema
            | DecodeError::MissingCompiler
            | DecodeError::SchemaLoad { .. }
            | DecodeError::SchemaPaths { .. } => ErrorKind::Internal,
            DecodeError::ReadBody { source } => match source.kind() {
                io::ErrorKind::TimedOut => ErrorKind::Internal,
                _ => ErrorKind::BadRequest,
            },
            _ => ErrorKind::BadRequest,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Human-readable reason, without structured detail.
    pub fn reason(&self) -> String {
        match self {
            DecodeError::Conversion(e) => format!("Expected value to be a {}.", e.expected),
            other => other.to_string(),
        }
    }

    /// Structured detail fields; empty unless a conversion failed.
    pub fn details(&self) -> BTreeMap<&'static str, String> {
        match self {
            DecodeError::Conversion(e) => e.details(),
            _ => BTreeMap::new(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DecodeError::SchemaLoad { source, .. } | DecodeError::SchemaPaths { source, .. } => {
                source.exit_code()
            }
            DecodeError::ReadBody { .. } => 3,
            _ if self.kind() == ErrorKind::Internal => 2,
            _ => 1,
        }
    }
}
