//! Decoder configuration.

use std::sync::Arc;

use crate::compiler::SchemaCompiler;
use crate::error::CompileError;
use crate::types::{
    ParseErrorStrategy, CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART_FORM,
    CONTENT_TYPE_URL_ENCODED_FORM, DEFAULT_ALLOWED_METHODS, DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH,
};

/// Options for a decode call.
///
/// Start from [`DecoderOptions::new`] and chain setters; later setters
/// override earlier ones.
///
/// ```
/// use schema_decoder::{DecoderOptions, ParseErrorStrategy};
///
/// let options = DecoderOptions::new()
///     .form_only()
///     .keep_request_body(true)
///     .parse_error_strategy(ParseErrorStrategy::ReturnOnConversionErrors);
///
/// assert!(options.keep_request_body);
/// assert!(!options.allows_content_type("application/json"));
/// ```
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Put a readable copy of the body back into the request after reading it.
    pub keep_request_body: bool,
    /// Accepted media types.
    pub allowed_content_types: Vec<String>,
    /// Accepted HTTP methods, upper case.
    pub allowed_methods: Vec<String>,
    /// Reference of the schema inside `compiler`.
    pub schema_ref: String,
    /// Registry the schema is compiled from.
    pub compiler: Option<Arc<SchemaCompiler>>,
    /// Validate the decoded payload against the schema.
    pub validate: bool,
    /// How often a circular `$ref` is expanded when listing schema paths.
    pub max_circular_reference_depth: u8,
    /// What to do with form values that don't parse as their declared type.
    pub parse_error_strategy: ParseErrorStrategy,
    /// Treat JSON bodies like forms: `{"foo.bar": 1}` sets `foo.bar`.
    pub json_flattened: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            keep_request_body: false,
            allowed_content_types: vec![
                CONTENT_TYPE_MULTIPART_FORM.to_string(),
                CONTENT_TYPE_URL_ENCODED_FORM.to_string(),
                CONTENT_TYPE_JSON.to_string(),
            ],
            allowed_methods: DEFAULT_ALLOWED_METHODS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            schema_ref: String::new(),
            compiler: None,
            validate: false,
            max_circular_reference_depth: DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH,
            parse_error_strategy: ParseErrorStrategy::default(),
            json_flattened: false,
        }
    }
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept form bodies (URL-encoded and multipart).
    pub fn form_only(mut self) -> Self {
        self.allowed_content_types = vec![
            CONTENT_TYPE_MULTIPART_FORM.to_string(),
            CONTENT_TYPE_URL_ENCODED_FORM.to_string(),
        ];
        self
    }

    /// Only accept JSON bodies.
    pub fn json_only(mut self) -> Self {
        self.allowed_content_types = vec![CONTENT_TYPE_JSON.to_string()];
        self
    }

    /// Keep the body readable for later consumers of the request.
    pub fn keep_request_body(mut self, keep: bool) -> Self {
        self.keep_request_body = keep;
        self
    }

    /// Enable or disable schema validation of decoded payloads.
    pub fn validate_payloads(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Decode JSON bodies with the form conventions (dotted keys).
    pub fn json_follows_form_format(mut self) -> Self {
        self.json_flattened = true;
        self
    }

    /// Replace the accepted HTTP methods.
    pub fn allowed_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_methods = methods
            .into_iter()
            .map(|m| m.as_ref().to_uppercase())
            .collect();
        self
    }

    pub fn parse_error_strategy(mut self, strategy: ParseErrorStrategy) -> Self {
        self.parse_error_strategy = strategy;
        self
    }

    pub fn max_circular_reference_depth(mut self, depth: u8) -> Self {
        self.max_circular_reference_depth = depth;
        self
    }

    /// Use the schema at `reference` in `compiler` for typing and validation.
    ///
    /// A `None` compiler is replaced by a fresh, empty one. Enables validation.
    pub fn json_schema_compiler(
        mut self,
        reference: impl Into<String>,
        compiler: Option<Arc<SchemaCompiler>>,
    ) -> Self {
        self.compiler = Some(compiler.unwrap_or_default());
        self.schema_ref = reference.into();
        self.validate = true;
        self
    }

    /// Use a schema given as raw JSON bytes. Enables validation.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidJson` if the bytes aren't valid JSON.
    pub fn raw_json_schema(mut self, raw: &[u8]) -> Result<Self, CompileError> {
        let compiler = SchemaCompiler::new();
        let id = compiler.add_raw(raw)?;
        self.compiler = Some(Arc::new(compiler));
        self.schema_ref = id;
        self.validate = true;
        Ok(self)
    }

    /// Returns true if `method` (any case) is accepted.
    pub fn allows_method(&self, method: &str) -> bool {
        let method = method.to_uppercase();
        self.allowed_methods.iter().any(|m| *m == method)
    }

    /// Returns true if `media_type` is accepted.
    pub fn allows_content_type(&self, media_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(media_type))
    }
}
