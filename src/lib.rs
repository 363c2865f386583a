//! Schema Decoder
//!
//! Schema-driven decoding of HTTP request bodies.
//!
//! JSON, URL-encoded and multipart bodies are decoded into any
//! `serde::de::DeserializeOwned` type. Form values (and, optionally, JSON with
//! dotted keys) are typed by a JSON Schema: the schema's property paths decide
//! which keys are accepted and how each raw string is converted, and the
//! resulting document can be validated against the same schema.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use http::Request;
//! use schema_decoder::{Body, Decoder, DecoderOptions, SchemaCompiler};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct Settings {
//!     ratio: f64,
//!     traits: Traits,
//! }
//!
//! #[derive(Deserialize)]
//! struct Traits {
//!     email: String,
//! }
//!
//! let compiler = SchemaCompiler::new();
//! compiler.add_resource(
//!     "settings.json",
//!     json!({
//!         "type": "object",
//!         "properties": {
//!             "ratio": { "type": "number" },
//!             "traits": {
//!                 "type": "object",
//!                 "properties": { "email": { "type": "string" } }
//!             }
//!         }
//!     }),
//! );
//! let options =
//!     DecoderOptions::new().json_schema_compiler("settings.json", Some(Arc::new(compiler)));
//!
//! let mut request = Request::post("/settings")
//!     .header("Content-Type", "application/x-www-form-urlencoded")
//!     .body(Body::from("ratio=0.5&traits.email=a%40example.com"))
//!     .unwrap();
//!
//! let settings: Settings = Decoder::new().decode(&mut request, &options).unwrap();
//! assert_eq!(settings.ratio, 0.5);
//! assert_eq!(settings.traits.email, "a@example.com");
//! ```
//!
//! # Conversion errors
//!
//! | Strategy | Value that doesn't parse |
//! |----------|--------------------------|
//! | `IgnoreConversionErrors` | Kept as the raw string |
//! | `UseEmptyValueOnConversionErrors` | Replaced by `0` / `false` |
//! | `ReturnOnConversionErrors` | Decode fails with the field and value |

mod body;
mod canonical;
mod coerce;
mod compiler;
mod decoder;
mod error;
mod form;
mod loader;
mod options;
mod paths;
mod types;
mod validator;

pub use body::Body;
pub use canonical::{build_canonical, set_path, split_path};
pub use coerce::{coerce, parse_bool, parse_number};
pub use compiler::{raw_resource_id, CompiledSchema, SchemaCompiler};
pub use decoder::Decoder;
pub use error::{
    CompileError, ConversionError, DecodeError, ErrorKind, FormError, SchemaViolation,
};
pub use form::{
    content_type_param, flatten_json_object, has_content_type, media_types, parse_multipart,
    parse_urlencoded, FormValues,
};
pub use loader::{
    is_url, load_schema, load_schema_auto, load_schema_bytes, navigate_fragment,
    split_reference,
};
pub use options::DecoderOptions;
pub use paths::list_paths;
pub use types::{
    json_type_name, ParseErrorStrategy, PathType, SchemaPath, CONTENT_TYPE_JSON,
    CONTENT_TYPE_MULTIPART_FORM, CONTENT_TYPE_URL_ENCODED_FORM, DEFAULT_ALLOWED_METHODS,
    DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH,
};
pub use validator::{collect_violations, validate_payload};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
